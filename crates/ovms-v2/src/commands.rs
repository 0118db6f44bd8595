//! Server command dispatch
//!
//! A `C<code>[,<args>]` frame is offered to the active vehicle first; if the
//! vehicle does not claim it the generic table below answers. Every command
//! gets at least one `c<code>,...` reply.

use ovms_core::{ChargeMode, CommandStatus, MsgCommandResult, NotifyType, Services, Vehicle};
use tracing::{debug, info, warn};

use crate::codec::{atoi, mp_encode};

/// Number of feature and parameter frames in a list reply
const LIST_SIZE: usize = 32;

/// Parameter slots addressable by `C3`/`C4`; empty slots are unsupported
const PARAM_MAP: [Option<(&str, &str)>; 15] = [
    Some(("vehicle", "registered.phone")),
    Some(("password", "module")),
    Some(("vehicle", "units.distance")),
    None,
    Some(("server.v2", "server")),
    Some(("modem", "apn")),
    Some(("modem", "apn.user")),
    Some(("modem", "apn.password")),
    Some(("vehicle", "id")),
    Some(("server.v2", "password")),
    None,
    None,
    None,
    None,
    None,
];

/// Subtype used for the charge alert notification
pub const CHARGE_ALERT_SUBTYPE: &str = "charge.stat";

/// Frames to send back, plus whether the module should restart afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    pub messages: Vec<String>,
    pub restart: bool,
}

impl CommandReply {
    fn single(message: String) -> Self {
        Self {
            messages: vec![message],
            restart: false,
        }
    }
}

fn param_slot(key: i64) -> Option<(&'static str, &'static str)> {
    usize::try_from(key)
        .ok()
        .and_then(|k| PARAM_MAP.get(k).copied().flatten())
}

/// Text after the first comma, if any
fn after_comma(text: &str) -> Option<&str> {
    text.split_once(',').map(|(_, rest)| rest)
}

fn result_code(status: CommandStatus) -> u8 {
    if status.is_success() {
        0
    } else {
        1
    }
}

/// Answers server commands against the shared services
pub struct CommandDispatcher {
    services: Services,
}

impl CommandDispatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Handle the payload of a `C` frame
    pub async fn dispatch(&self, payload: &str) -> CommandReply {
        let code = i32::try_from(atoi(payload)).unwrap_or(-1);
        let args = after_comma(payload);
        let vehicle = self.services.vehicles.active();
        info!(code, args = args.unwrap_or(""), "Server command");

        if let Some(vehicle) = &vehicle {
            match vehicle.process_msg_command(code, args).await {
                MsgCommandResult::NotImplemented => {}
                MsgCommandResult::Success(text) => {
                    return CommandReply::single(format!("MP-0 c{},0,{}", code, text));
                }
                MsgCommandResult::Failure(text) => {
                    return CommandReply::single(format!("MP-0 c{},1,{}", code, text));
                }
            }
        }

        match code {
            1 => self.feature_list(vehicle.as_deref()),
            2 => self.set_feature(vehicle.as_deref(), args),
            3 => self.parameter_list(),
            4 => self.set_parameter(args),
            5 => self.reboot(),
            6 => self.charge_alert().await,
            7 => self.shell_command(args).await,
            41 => self.ussd(args),
            10..=12 | 15..=25 => {
                let rc = match &vehicle {
                    Some(vehicle) => result_code(vehicle_command(&**vehicle, code, args).await),
                    None => 1,
                };
                CommandReply::single(format!("MP-0 c{},{}", code, rc))
            }
            _ => {
                debug!(code, "Unsupported server command");
                CommandReply::single(format!("MP-0 c{},2", code))
            }
        }
    }

    fn feature_list(&self, vehicle: Option<&dyn Vehicle>) -> CommandReply {
        let messages = (0..LIST_SIZE)
            .map(|k| {
                let value = vehicle
                    .and_then(|v| v.get_feature(k as u32))
                    .unwrap_or_else(|| "0".to_string());
                format!("MP-0 c1,0,{},{},{}", k, LIST_SIZE, value)
            })
            .collect();
        CommandReply {
            messages,
            restart: false,
        }
    }

    fn set_feature(&self, vehicle: Option<&dyn Vehicle>, args: Option<&str>) -> CommandReply {
        let outcome = match (vehicle, args) {
            (None, _) => Err("No active vehicle"),
            (Some(_), None) => Err("Missing feature key"),
            (Some(vehicle), Some(args)) => {
                let value = after_comma(args).unwrap_or("");
                match u32::try_from(atoi(args)) {
                    Ok(key) if vehicle.set_feature(key, value) => Ok(()),
                    _ => Err("Feature not supported by vehicle"),
                }
            }
        };
        CommandReply::single(match outcome {
            Ok(()) => "MP-0 c2,0,".to_string(),
            Err(reason) => format!("MP-0 c2,1,{}", reason),
        })
    }

    fn parameter_list(&self) -> CommandReply {
        let config = &self.services.config;
        let messages = (0..LIST_SIZE)
            .map(|k| {
                let value = param_slot(k as i64)
                    .map(|(param, instance)| config.get_param_value(param, instance))
                    .unwrap_or_default();
                format!("MP-0 c3,0,{},{},{}", k, LIST_SIZE, value)
            })
            .collect();
        CommandReply {
            messages,
            restart: false,
        }
    }

    fn set_parameter(&self, args: Option<&str>) -> CommandReply {
        let Some(args) = args else {
            return CommandReply::single("MP-0 c4,1,Missing parameter key".to_string());
        };
        match param_slot(atoi(args)) {
            Some((param, instance)) => {
                let value = after_comma(args).unwrap_or("");
                self.services.config.set_param_value(param, instance, value);
                CommandReply::single("MP-0 c4,0,".to_string())
            }
            None => CommandReply::single("MP-0 c4,1,Parameter key not supported".to_string()),
        }
    }

    fn reboot(&self) -> CommandReply {
        if self.services.system.is_none() {
            warn!("Restart requested but no system control is available");
            return CommandReply::single("MP-0 c5,1".to_string());
        }
        CommandReply {
            messages: vec!["MP-0 c5,0".to_string()],
            restart: true,
        }
    }

    async fn charge_alert(&self) -> CommandReply {
        let Some(shell) = &self.services.shell else {
            return CommandReply::single("MP-0 c6,1".to_string());
        };
        let output = shell.execute("stat").await;
        self.services
            .notify
            .raise(NotifyType::Info, CHARGE_ALERT_SUBTYPE, &output);
        CommandReply::single("MP-0 c6,0".to_string())
    }

    async fn shell_command(&self, args: Option<&str>) -> CommandReply {
        let Some(line) = args.filter(|a| !a.is_empty()) else {
            return CommandReply::single("MP-0 c7,1,No command".to_string());
        };
        let Some(shell) = &self.services.shell else {
            return CommandReply::single("MP-0 c7,1,No command shell".to_string());
        };
        let output = shell.execute(line).await;
        CommandReply::single(format!("MP-0 c7,0,{}", mp_encode(&output)))
    }

    fn ussd(&self, args: Option<&str>) -> CommandReply {
        let Some(code) = args else {
            return CommandReply::single("MP-0 c41,1,No command".to_string());
        };
        let at = format!("AT+CUSD=1,\"{}\",15\r\n", code);
        let sent = self
            .services
            .modem
            .as_ref()
            .is_some_and(|modem| modem.send_command(&at));
        CommandReply::single(if sent {
            "MP-0 c41,0".to_string()
        } else {
            "MP-0 c41,1,Cannot send command".to_string()
        })
    }
}

/// Vehicle control commands; missing arguments count as failure
async fn vehicle_command(vehicle: &dyn Vehicle, code: i32, args: Option<&str>) -> CommandStatus {
    match (code, args) {
        (11, _) => vehicle.start_charge().await,
        (12, _) => vehicle.stop_charge().await,
        (18 | 19, _) => vehicle.wakeup().await,
        (25, _) => vehicle.cooldown(true).await,
        (_, None) => CommandStatus::Fail,
        (10, Some(args)) => match ChargeMode::from_code(atoi(args)) {
            Some(mode) => vehicle.set_charge_mode(mode).await,
            None => CommandStatus::Fail,
        },
        (15, Some(args)) => vehicle.set_charge_current(atoi(args)).await,
        (16, Some(args)) => {
            let (Some(mode), Some(current)) = (ChargeMode::from_code(atoi(args)), after_comma(args))
            else {
                return CommandStatus::Fail;
            };
            match vehicle.set_charge_mode(mode).await {
                CommandStatus::Success => vehicle.set_charge_current(atoi(current)).await,
                other => other,
            }
        }
        (17, Some(args)) => match after_comma(args) {
            Some(start) => vehicle.set_charge_timer(atoi(args) != 0, atoi(start)).await,
            None => CommandStatus::Fail,
        },
        (20, Some(pin)) => vehicle.lock(pin).await,
        (21, Some(pin)) => vehicle.activate_valet(pin).await,
        (22, Some(pin)) => vehicle.unlock(pin).await,
        (23, Some(pin)) => vehicle.deactivate_valet(pin).await,
        (24, Some(args)) => vehicle.homelink(atoi(args)).await,
        _ => CommandStatus::NotImplemented,
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ovms_core::{CommandShell, Modem, SystemControl};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct TestVehicle {
        features: Mutex<Vec<(u32, String)>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Vehicle for TestVehicle {
        fn vehicle_type(&self) -> &str {
            "TEST"
        }

        async fn process_msg_command(&self, code: i32, args: Option<&str>) -> MsgCommandResult {
            match code {
                99 => MsgCommandResult::Success(format!("echo {}", args.unwrap_or(""))),
                98 => MsgCommandResult::Failure("nope".to_string()),
                _ => MsgCommandResult::NotImplemented,
            }
        }

        fn get_feature(&self, key: u32) -> Option<String> {
            self.features
                .lock()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        }

        fn set_feature(&self, key: u32, value: &str) -> bool {
            if key > 15 {
                return false;
            }
            self.features.lock().push((key, value.to_string()));
            true
        }

        async fn set_charge_mode(&self, mode: ChargeMode) -> CommandStatus {
            self.calls.lock().push(format!("mode {}", mode));
            CommandStatus::Success
        }

        async fn set_charge_current(&self, limit: i64) -> CommandStatus {
            self.calls.lock().push(format!("current {}", limit));
            CommandStatus::Success
        }

        async fn lock(&self, pin: &str) -> CommandStatus {
            if pin == "1234" {
                CommandStatus::Success
            } else {
                CommandStatus::Fail
            }
        }
    }

    struct EchoShell;

    #[async_trait]
    impl CommandShell for EchoShell {
        async fn execute(&self, line: &str) -> String {
            format!("ran {}\nline two, done", line)
        }
    }

    struct TestModem(Mutex<Vec<String>>);

    impl Modem for TestModem {
        fn send_command(&self, command: &str) -> bool {
            self.0.lock().push(command.to_string());
            true
        }
    }

    struct TestSystem(AtomicBool);

    impl SystemControl for TestSystem {
        fn restart(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn with_vehicle() -> (Services, Arc<TestVehicle>) {
        let services = Services::new();
        let vehicle = Arc::new(TestVehicle::default());
        services.vehicles.set_active(vehicle.clone());
        (services, vehicle)
    }

    async fn reply(services: &Services, payload: &str) -> Vec<String> {
        CommandDispatcher::new(services.clone())
            .dispatch(payload)
            .await
            .messages
    }

    #[tokio::test]
    async fn test_set_feature_without_vehicle() {
        let services = Services::new();
        assert_eq!(reply(&services, "2,3,1").await, vec!["MP-0 c2,1,No active vehicle"]);
    }

    #[tokio::test]
    async fn test_set_feature_with_vehicle() {
        let (services, vehicle) = with_vehicle();
        assert_eq!(reply(&services, "2").await, vec!["MP-0 c2,1,Missing feature key"]);
        assert_eq!(reply(&services, "2,3,42").await, vec!["MP-0 c2,0,"]);
        assert_eq!(vehicle.get_feature(3).as_deref(), Some("42"));
        assert_eq!(
            reply(&services, "2,20,1").await,
            vec!["MP-0 c2,1,Feature not supported by vehicle"]
        );
    }

    #[tokio::test]
    async fn test_feature_list() {
        let (services, vehicle) = with_vehicle();
        vehicle.set_feature(2, "5");
        let out = reply(&services, "1").await;
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], "MP-0 c1,0,0,32,0");
        assert_eq!(out[2], "MP-0 c1,0,2,32,5");
        assert_eq!(out[31], "MP-0 c1,0,31,32,0");
    }

    #[tokio::test]
    async fn test_parameters() {
        let services = Services::new();
        assert_eq!(reply(&services, "4,8,DEMO1").await, vec!["MP-0 c4,0,"]);
        assert_eq!(services.config.get_param_value("vehicle", "id"), "DEMO1");
        assert_eq!(
            reply(&services, "4,3,x").await,
            vec!["MP-0 c4,1,Parameter key not supported"]
        );
        assert_eq!(
            reply(&services, "4,20,x").await,
            vec!["MP-0 c4,1,Parameter key not supported"]
        );
        assert_eq!(reply(&services, "4").await, vec!["MP-0 c4,1,Missing parameter key"]);

        let list = reply(&services, "3").await;
        assert_eq!(list.len(), 32);
        assert_eq!(list[8], "MP-0 c3,0,8,32,DEMO1");
        assert_eq!(list[20], "MP-0 c3,0,20,32,");
    }

    #[tokio::test]
    async fn test_vehicle_claims_command() {
        let (services, _) = with_vehicle();
        assert_eq!(reply(&services, "99,hi").await, vec!["MP-0 c99,0,echo hi"]);
        assert_eq!(reply(&services, "98").await, vec!["MP-0 c98,1,nope"]);
    }

    #[tokio::test]
    async fn test_vehicle_commands() {
        let (services, vehicle) = with_vehicle();
        assert_eq!(reply(&services, "16,3,32").await, vec!["MP-0 c16,0"]);
        assert_eq!(
            *vehicle.calls.lock(),
            vec!["mode range".to_string(), "current 32".to_string()]
        );
        assert_eq!(reply(&services, "16,3").await, vec!["MP-0 c16,1"]);
        assert_eq!(reply(&services, "10,2").await, vec!["MP-0 c10,1"]);
        assert_eq!(reply(&services, "20,1234").await, vec!["MP-0 c20,0"]);
        assert_eq!(reply(&services, "20,0000").await, vec!["MP-0 c20,1"]);
        assert_eq!(reply(&services, "20").await, vec!["MP-0 c20,1"]);
        // Not implemented by the vehicle
        assert_eq!(reply(&services, "11").await, vec!["MP-0 c11,1"]);
    }

    #[tokio::test]
    async fn test_vehicle_commands_without_vehicle() {
        let services = Services::new();
        assert_eq!(reply(&services, "11").await, vec!["MP-0 c11,1"]);
        assert_eq!(reply(&services, "1").await[5], "MP-0 c1,0,5,32,0");
    }

    #[tokio::test]
    async fn test_unsupported_codes() {
        let services = Services::new();
        assert_eq!(reply(&services, "40,123,hi").await, vec!["MP-0 c40,2"]);
        assert_eq!(reply(&services, "49,AT").await, vec!["MP-0 c49,2"]);
        assert_eq!(reply(&services, "77").await, vec!["MP-0 c77,2"]);
    }

    #[tokio::test]
    async fn test_shell_and_charge_alert() {
        let services = Services::new().with_shell(Arc::new(EchoShell));
        assert_eq!(
            reply(&services, "7,metrics list").await,
            vec!["MP-0 c7,0,ran metrics list\rline two; done"]
        );
        assert_eq!(reply(&services, "7").await, vec!["MP-0 c7,1,No command"]);

        assert_eq!(reply(&services, "6").await, vec!["MP-0 c6,0"]);
        assert_eq!(services.notify.len(NotifyType::Info), 1);
    }

    #[tokio::test]
    async fn test_ussd() {
        let services = Services::new();
        assert_eq!(
            reply(&services, "41,*100#").await,
            vec!["MP-0 c41,1,Cannot send command"]
        );

        let modem = Arc::new(TestModem(Mutex::new(Vec::new())));
        let services = services.with_modem(modem.clone());
        assert_eq!(reply(&services, "41,*100#").await, vec!["MP-0 c41,0"]);
        assert_eq!(*modem.0.lock(), vec!["AT+CUSD=1,\"*100#\",15\r\n".to_string()]);
        assert_eq!(reply(&services, "41").await, vec!["MP-0 c41,1,No command"]);
    }

    #[tokio::test]
    async fn test_reboot() {
        let services = Services::new();
        let out = CommandDispatcher::new(services.clone()).dispatch("5").await;
        assert_eq!(out.messages, vec!["MP-0 c5,1"]);
        assert!(!out.restart);

        let system = Arc::new(TestSystem(AtomicBool::new(false)));
        let services = services.with_system(system);
        let out = CommandDispatcher::new(services).dispatch("5").await;
        assert_eq!(out.messages, vec!["MP-0 c5,0"]);
        assert!(out.restart);
    }
}
