//! Device Binder
//!
//! Correlates a freshly spawned clone with the adb connection its player
//! process brings up. The Nth instance created (by pool creation ordinal) is
//! bound to the Nth connection in the registry: once the oldest-first listing
//! reaches the expected count, the connection at `expected_count - 1` (the
//! Nth in insertion order) is selected.
//!
//! This is a best-effort positional correlation, not a guaranteed one. If
//! connections drop and reappear, or several appear within one poll tick,
//! the index can bind the wrong connection to the wrong instance. A stronger
//! scheme would have each clone advertise a unique token readable over its
//! connection and bind by matching it, falling back to position only as a
//! degraded mode; the player offers no such channel today, so the positional
//! contract stands and is documented here instead of being papered over.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::adb::{AdbClient, AdbError};
use crate::device::Device;
use crate::error::{EmulatorError, Result};

/// Source of the current adb connection listing.
///
/// Seam between the binder and the real adb client, so binding can be
/// exercised against scripted listings.
#[allow(async_fn_in_trait)]
pub trait DeviceRegistry {
    /// Current connection listing, oldest first
    async fn devices(&self) -> std::result::Result<Vec<Device>, AdbError>;
}

impl DeviceRegistry for AdbClient {
    async fn devices(&self) -> std::result::Result<Vec<Device>, AdbError> {
        self.list_devices().await
    }
}

/// Waits for a clone's adb connection and selects it positionally.
pub struct DeviceBinder<R: DeviceRegistry> {
    registry: R,
    timeout: Duration,
    poll_interval: Duration,
}

impl<R: DeviceRegistry> DeviceBinder<R> {
    pub fn new(registry: R, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            registry,
            timeout,
            poll_interval,
        }
    }

    /// Block until the registry holds at least `expected_count` connections,
    /// then return the `expected_count`-th one of the oldest-first listing.
    ///
    /// `expected_count` is the 1-based creation ordinal of the instance being
    /// bound. The wait is a sleep-backoff poll against a deadline; it fails
    /// with `BindTimedOut` when the budget elapses, never spins forever.
    pub async fn wait_and_bind(&self, expected_count: usize) -> Result<Device> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let devices = self.registry.devices().await?;
            trace!(
                "Registry holds {} connection(s), waiting for {}",
                devices.len(),
                expected_count
            );

            if expected_count > 0 && devices.len() >= expected_count {
                let index = expected_count - 1;
                let device = devices[index].clone();
                debug!(
                    "Bound connection {} (index {} of {})",
                    device.serial,
                    index,
                    devices.len()
                );
                return Ok(device);
            }

            if Instant::now() >= deadline {
                return Err(EmulatorError::BindTimedOut {
                    expected: expected_count,
                    timeout: self.timeout,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
