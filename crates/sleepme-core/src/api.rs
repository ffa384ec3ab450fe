// ── Transport seam ──
//
// The coordinators only need three calls. Abstracting them lets tests
// drive the full command/verify/poll machinery without a network.

use std::future::Future;

use serde_json::Value;
use sleepme_api::{ClaimedDevice, DevicePatch, DeviceStatus, SleepMeClient};

/// One-request-per-call access to the device API.
///
/// Implementations perform no rate limiting or retries of their own.
pub trait DeviceApi: Send + Sync + 'static {
    fn get_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<DeviceStatus, sleepme_api::Error>> + Send;

    fn patch_device(
        &self,
        device_id: &str,
        patch: &DevicePatch,
    ) -> impl Future<Output = Result<Value, sleepme_api::Error>> + Send;

    fn list_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<ClaimedDevice>, sleepme_api::Error>> + Send;
}

impl DeviceApi for SleepMeClient {
    fn get_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<DeviceStatus, sleepme_api::Error>> + Send {
        SleepMeClient::get_device(self, device_id)
    }

    fn patch_device(
        &self,
        device_id: &str,
        patch: &DevicePatch,
    ) -> impl Future<Output = Result<Value, sleepme_api::Error>> + Send {
        SleepMeClient::patch_device(self, device_id, patch)
    }

    fn list_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<ClaimedDevice>, sleepme_api::Error>> + Send {
        SleepMeClient::list_devices(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fake {
    //! Scripted in-memory device for coordinator tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{Value, json};
    use sleepme_api::{ClaimedDevice, DevicePatch, DeviceStatus, ThermalControlStatus};

    use super::DeviceApi;

    /// A recorded API call.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Get,
        Patch(DevicePatch),
        List,
    }

    #[derive(Debug, Default)]
    struct State {
        control: serde_json::Map<String, Value>,
        /// When set, PATCHes are acknowledged but not applied.
        ignore_writes: bool,
        get_failures: VecDeque<sleepme_api::Error>,
        /// GETs answered with an empty `{}` document.
        empty_gets: usize,
        patch_failures: VecDeque<sleepme_api::Error>,
        patch_delay: Duration,
        calls: Vec<Call>,
    }

    /// Fake device whose control section reflects applied PATCHes.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct FakeDevice {
        state: Arc<Mutex<State>>,
    }

    impl FakeDevice {
        pub(crate) fn new() -> Self {
            let device = Self::default();
            {
                let mut state = device.lock();
                state.control.insert("set_temperature_c".into(), json!(20.0));
                state
                    .control
                    .insert("thermal_control_status".into(), json!("active"));
                state
                    .control
                    .insert("has_schedule_enabled".into(), json!(false));
                state
                    .control
                    .insert("brightness_level_percent".into(), json!(50));
            }
            device
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap()
        }

        pub(crate) fn set_control(&self, key: &str, value: Value) {
            self.lock().control.insert(key.into(), value);
        }

        pub(crate) fn ignore_writes(&self) {
            self.lock().ignore_writes = true;
        }

        pub(crate) fn fail_next_get(&self, err: sleepme_api::Error) {
            self.lock().get_failures.push_back(err);
        }

        pub(crate) fn empty_next_get(&self) {
            self.lock().empty_gets += 1;
        }

        pub(crate) fn fail_next_patch(&self, err: sleepme_api::Error) {
            self.lock().patch_failures.push_back(err);
        }

        pub(crate) fn set_patch_delay(&self, delay: Duration) {
            self.lock().patch_delay = delay;
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.lock().calls.clone()
        }

        pub(crate) fn patches(&self) -> Vec<DevicePatch> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Patch(p) => Some(p),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.lock().calls.iter().filter(|c| pred(c)).count()
        }

        fn apply(state: &mut State, patch: &DevicePatch) {
            if let Some(t) = patch.set_temperature_c {
                state.control.insert("set_temperature_c".into(), json!(t));
            }
            if let Some(s) = patch.thermal_control_status {
                state
                    .control
                    .insert("thermal_control_status".into(), json!(s.to_string()));
            }
            if let Some(on) = patch.has_schedule_enabled {
                state.control.insert("has_schedule_enabled".into(), json!(on));
            }
            if let Some(b) = patch.brightness_level_percent {
                state
                    .control
                    .insert("brightness_level_percent".into(), json!(b));
            }
        }
    }

    impl DeviceApi for FakeDevice {
        async fn get_device(&self, _device_id: &str) -> Result<DeviceStatus, sleepme_api::Error> {
            let mut state = self.lock();
            state.calls.push(Call::Get);
            if let Some(err) = state.get_failures.pop_front() {
                return Err(err);
            }
            if state.empty_gets > 0 {
                state.empty_gets -= 1;
                return Ok(DeviceStatus::default());
            }
            let mut status = serde_json::Map::new();
            status.insert("water_temperature_c".into(), json!(24.0));
            status.insert("water_level_percent".into(), json!(90));
            status.insert("is_connected".into(), json!(true));
            Ok(DeviceStatus {
                status,
                control: state.control.clone(),
                about: serde_json::Map::new(),
            })
        }

        async fn patch_device(
            &self,
            _device_id: &str,
            patch: &DevicePatch,
        ) -> Result<Value, sleepme_api::Error> {
            let delay = {
                let mut state = self.lock();
                state.calls.push(Call::Patch(patch.clone()));
                state.patch_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.lock();
            if let Some(err) = state.patch_failures.pop_front() {
                return Err(err);
            }
            if !state.ignore_writes {
                Self::apply(&mut state, patch);
            }
            Ok(Value::Null)
        }

        async fn list_devices(&self) -> Result<Vec<ClaimedDevice>, sleepme_api::Error> {
            self.lock().calls.push(Call::List);
            Ok(vec![ClaimedDevice {
                id: "dev-1".into(),
                name: "Bedroom".into(),
                attachments: vec![],
                extra: serde_json::Map::new(),
            }])
        }
    }

    pub(crate) fn is_get(call: &Call) -> bool {
        matches!(call, Call::Get)
    }

    pub(crate) fn is_patch(call: &Call) -> bool {
        matches!(call, Call::Patch(_))
    }

    pub(crate) fn standby() -> Value {
        json!(ThermalControlStatus::Standby.to_string())
    }
}
