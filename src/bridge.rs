//! Native bridging: pointing two call legs' transports directly at each other.
//!
//! When both legs speak a shared codec, the channel layer can stop relaying frames and
//! let the far ends exchange media directly. This module does the negotiation and the
//! small amount of mid-call supervision (control forwarding, address changes) that
//! remains while the legs are cross-connected.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::sleep;
use std::time::Duration;

use thiserror::Error;

use crate::format::Codec;
use crate::frame::ControlOp;

/// How long to back off between trylock attempts.
const LOCK_RETRY: Duration = Duration::from_millis(1);

/// Trylock attempts before giving up on a leg pair.
const LOCK_ATTEMPTS: usize = 500;

/// What a call leg must expose to be natively bridgeable.
///
/// Implemented by the channel layer's leg type, which owns the actual
/// `RtpSession`/`UdptlSession` and socket.
pub trait BridgeLeg: Send {
    /// Codecs this leg can put on the wire without transcoding.
    fn codecs(&self) -> Vec<Codec>;

    /// The media address this leg currently sends to.
    fn peer(&self) -> Option<SocketAddr>;

    /// Redirect this leg's media to a new address (or back to none).
    fn set_peer(&mut self, addr: Option<SocketAddr>);

    /// Deliver a control indication (hold, unhold, video update) to this leg.
    fn indicate(&mut self, op: ControlOp);
}

/// Which of the two bridged legs an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeSide {
    /// The first leg given to [`NativeBridge::new`].
    A,
    /// The second leg.
    B,
}

impl BridgeSide {
    fn other(&self) -> BridgeSide {
        match self {
            BridgeSide::A => BridgeSide::B,
            BridgeSide::B => BridgeSide::A,
        }
    }
}

/// An event observed on one bridged leg, reported by the channel layer.
#[derive(Debug, Clone)]
pub enum LegEvent {
    /// The leg received a control frame to pass across.
    Control(ControlOp),
    /// The leg's media address changed mid-call (re-negotiation).
    PeerChanged(SocketAddr),
    /// The leg is being torn down, masqueraded, or swapped out.
    Gone,
}

/// What the channel layer should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Legs are cross-connected; keep supervising.
    Complete,
    /// No shared codec. Not an error; relay frames in the channel layer instead.
    Incompatible,
    /// The native bridge has been unwound; resume frame-relay bridging.
    Retry,
}

/// Errors from bridge negotiation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// Could not acquire both legs within the retry budget.
    #[error("could not lock both legs")]
    LockContended,

    /// A leg's lock was poisoned by a panicking holder.
    #[error("leg lock poisoned")]
    Poisoned,
}

/// Cross-connects two legs and supervises them while connected.
///
/// The two legs are not intrinsically ordered, so both-leg acquisition uses
/// trylock-with-backoff instead of a fixed lock order: lock one, attempt the other,
/// release and sleep on contention.
pub struct NativeBridge {
    a: Arc<Mutex<dyn BridgeLeg>>,
    b: Arc<Mutex<dyn BridgeLeg>>,
    saved: Option<(Option<SocketAddr>, Option<SocketAddr>)>,
}

impl NativeBridge {
    /// A bridge over two legs. No redirection happens until [`establish`][Self::establish].
    pub fn new(a: Arc<Mutex<dyn BridgeLeg>>, b: Arc<Mutex<dyn BridgeLeg>>) -> Self {
        NativeBridge { a, b, saved: None }
    }

    /// Try to cross-connect the legs.
    ///
    /// Returns [`BridgeOutcome::Incompatible`] when the legs share no codec, leaving
    /// both untouched. On success each leg's peer address is saved and repointed at the
    /// other leg's current address.
    pub fn establish(&mut self) -> Result<BridgeOutcome, BridgeError> {
        let saved = {
            let (mut ga, mut gb) = self.lock_both()?;

            let ca = ga.codecs();
            if !gb.codecs().iter().any(|c| ca.contains(c)) {
                debug!("No shared codec between legs, not bridging natively");
                return Ok(BridgeOutcome::Incompatible);
            }

            let pa = ga.peer();
            let pb = gb.peer();
            ga.set_peer(pb);
            gb.set_peer(pa);
            info!("Natively bridged two legs ({:?} <-> {:?})", pa, pb);
            (pa, pb)
        };

        self.saved = Some(saved);
        Ok(BridgeOutcome::Complete)
    }

    /// React to an event observed on one leg while bridged.
    pub fn on_event(&mut self, side: BridgeSide, event: LegEvent) -> Result<BridgeOutcome, BridgeError> {
        match event {
            LegEvent::Control(op) => {
                self.lock_one(side.other())?.indicate(op);
                Ok(BridgeOutcome::Complete)
            }
            LegEvent::PeerChanged(addr) => {
                self.lock_one(side.other())?.set_peer(Some(addr));
                debug!("Repointed {:?} leg at {}", side.other(), addr);
                Ok(BridgeOutcome::Complete)
            }
            LegEvent::Gone => {
                self.unwind()?;
                Ok(BridgeOutcome::Retry)
            }
        }
    }

    /// Restore both legs' saved peer addresses. Idempotent.
    pub fn unwind(&mut self) -> Result<(), BridgeError> {
        let Some((pa, pb)) = self.saved.take() else {
            return Ok(());
        };
        let (mut ga, mut gb) = self.lock_both()?;
        ga.set_peer(pa);
        gb.set_peer(pb);
        info!("Unwound native bridge");
        Ok(())
    }

    fn lock_one(
        &self,
        side: BridgeSide,
    ) -> Result<MutexGuard<'_, dyn BridgeLeg + 'static>, BridgeError> {
        let m = match side {
            BridgeSide::A => &self.a,
            BridgeSide::B => &self.b,
        };
        m.lock().map_err(|_| BridgeError::Poisoned)
    }

    #[allow(clippy::type_complexity)]
    fn lock_both(
        &self,
    ) -> Result<
        (
            MutexGuard<'_, dyn BridgeLeg + 'static>,
            MutexGuard<'_, dyn BridgeLeg + 'static>,
        ),
        BridgeError,
    > {
        for _ in 0..LOCK_ATTEMPTS {
            let ga = self.a.lock().map_err(|_| BridgeError::Poisoned)?;
            match self.b.try_lock() {
                Ok(gb) => return Ok((ga, gb)),
                Err(TryLockError::Poisoned(_)) => return Err(BridgeError::Poisoned),
                Err(TryLockError::WouldBlock) => {
                    drop(ga);
                    sleep(LOCK_RETRY);
                }
            }
        }
        warn!("Gave up locking both legs after {} attempts", LOCK_ATTEMPTS);
        Err(BridgeError::LockContended)
    }
}
