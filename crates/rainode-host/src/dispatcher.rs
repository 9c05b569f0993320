//! Maps decoded host-read requests onto [`HostApi`] operations.
//!
//! Every request produces exactly one response string, even when the host
//! operation fails; the request's declared default is written back so the
//! subprocess's blocking read never stalls.

use rainode_protocol::{format_double, HostRequest, Severity};

use crate::HostApi;

/// Produce the single response line payload for a host-read request.
pub fn respond(api: &dyn HostApi, request: &HostRequest) -> String {
    match try_respond(api, request) {
        Ok(response) => response,
        Err(err) => {
            api.log(Severity::Error, &format!("Host command failed: {err}"));
            request.default_response()
        }
    }
}

fn try_respond(api: &dyn HostApi, request: &HostRequest) -> Result<String, crate::HostError> {
    match request {
        HostRequest::GetVariable { name, default } => {
            let reference = format!("#{name}#");
            let replaced = api.replace_variable(&reference)?;
            // An unreplaced reference means the variable is undefined.
            if replaced == reference {
                Ok(default.clone())
            } else {
                Ok(replaced)
            }
        }
        HostRequest::ReadString { option, default } => api.read_string(option, default),
        HostRequest::ReadStringFromSection {
            section,
            option,
            default,
        } => api.read_string_from_section(section, option, default),
        HostRequest::ReadDouble { option, default } => {
            api.read_double(option, *default).map(format_double)
        }
        HostRequest::ReadDoubleFromSection {
            section,
            option,
            default,
        } => api
            .read_double_from_section(section, option, *default)
            .map(format_double),
        HostRequest::ReadInt { option, default } => {
            api.read_int(option, *default).map(|v| v.to_string())
        }
        HostRequest::ReadIntFromSection {
            section,
            option,
            default,
        } => api
            .read_int_from_section(section, option, *default)
            .map(|v| v.to_string()),
        HostRequest::GetMeasureName => Ok(api.measure_name()),
        HostRequest::GetSkinName => Ok(api.skin_name()),
        HostRequest::GetSkin => Ok(api.skin()),
        HostRequest::GetSkinWindow => Ok(api.skin_window()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostError;
    use std::sync::Mutex;

    /// Host whose reads all fail, for exercising the default-on-error rule.
    struct FailingHost {
        logged: Mutex<Vec<String>>,
    }

    impl FailingHost {
        fn new() -> Self {
            Self {
                logged: Mutex::new(Vec::new()),
            }
        }
    }

    impl HostApi for FailingHost {
        fn execute(&self, _command: &str) {}
        fn replace_variable(&self, _text: &str) -> Result<String, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_string(&self, _o: &str, _d: &str) -> Result<String, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_string_from_section(
            &self,
            _s: &str,
            _o: &str,
            _d: &str,
        ) -> Result<String, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_double(&self, _o: &str, _d: f64) -> Result<f64, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_double_from_section(&self, _s: &str, _o: &str, _d: f64) -> Result<f64, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_int(&self, _o: &str, _d: i32) -> Result<i32, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn read_int_from_section(&self, _s: &str, _o: &str, _d: i32) -> Result<i32, HostError> {
            Err(HostError("config unavailable".to_string()))
        }
        fn measure_name(&self) -> String {
            String::new()
        }
        fn skin_name(&self) -> String {
            String::new()
        }
        fn skin(&self) -> String {
            String::new()
        }
        fn skin_window(&self) -> String {
            String::new()
        }
        fn log(&self, _severity: Severity, message: &str) {
            if let Ok(mut lines) = self.logged.lock() {
                lines.push(message.to_string());
            }
        }
    }

    #[test]
    fn failing_reads_answer_the_declared_default() {
        let host = FailingHost::new();
        let response = respond(
            &host,
            &HostRequest::ReadDouble {
                option: "Scale".to_string(),
                default: 2.5,
            },
        );
        assert_eq!(response, "2.5");
        assert_eq!(host.logged.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_variable_lookup_answers_the_default() {
        let host = FailingHost::new();
        let response = respond(
            &host,
            &HostRequest::GetVariable {
                name: "City".to_string(),
                default: "nowhere".to_string(),
            },
        );
        assert_eq!(response, "nowhere");
    }

    #[test]
    fn identity_requests_never_fail() {
        let host = FailingHost::new();
        assert_eq!(respond(&host, &HostRequest::GetMeasureName), "");
        assert_eq!(respond(&host, &HostRequest::GetSkinWindow), "");
    }
}
