//! Line protocol spoken between the host and script subprocesses.
//!
//! Every record on the pipe is a single newline-terminated UTF-8 line,
//! identified by a fixed string prefix. The subprocess writes log lines,
//! host-call requests, and result markers on stdout; the host answers each
//! read request with exactly one plain line on the subprocess's stdin.
//!
//! Decoding is prefix matching on the trimmed line. Anything non-empty that
//! matches no tag is unstructured diagnostic output and decodes to
//! [`Line::Plain`].

pub mod tags {
    //! Fixed line prefixes. Tags that carry a payload include the trailing
    //! space; the no-argument get tags do not.

    pub const LOG_NOTICE: &str = "@@LOG_NOTICE ";
    pub const LOG_WARNING: &str = "@@LOG_WARNING ";
    pub const LOG_DEBUG: &str = "@@LOG_DEBUG ";
    pub const LOG_ERROR: &str = "@@LOG_ERROR ";

    pub const EXECUTE: &str = "@@RM_EXECUTE ";

    pub const GET_VARIABLE: &str = "@@RM_GETVARIABLE ";
    pub const READ_STRING: &str = "@@RM_READSTRING ";
    pub const READ_STRING_FROM_SECTION: &str = "@@RM_READSTRINGFROMSECTION ";
    pub const READ_DOUBLE: &str = "@@RM_READDOUBLE ";
    pub const READ_DOUBLE_FROM_SECTION: &str = "@@RM_READDOUBLEFROMSECTION ";
    pub const READ_INT: &str = "@@RM_READINT ";
    pub const READ_INT_FROM_SECTION: &str = "@@RM_READINTFROMSECTION ";
    pub const GET_MEASURE_NAME: &str = "@@RM_GETMEASURENAME";
    pub const GET_SKIN_NAME: &str = "@@RM_GETSKINNAME";
    pub const GET_SKIN: &str = "@@RM_GETSKIN";
    pub const GET_SKIN_WINDOW: &str = "@@RM_GETSKINWINDOW";

    pub const INIT_RESULT: &str = "@@INIT_RESULT ";
    pub const UPDATE_RESULT: &str = "@@UPDATE_RESULT ";
    pub const CUSTOM_RESULT: &str = "@@CUSTOM_RESULT ";
}

/// Log severity carried by a tagged diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Notice,
    Warning,
    Debug,
    Error,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Notice => tags::LOG_NOTICE,
            Severity::Warning => tags::LOG_WARNING,
            Severity::Debug => tags::LOG_DEBUG,
            Severity::Error => tags::LOG_ERROR,
        }
    }
}

/// The three result-producing run modes of the wrapper program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Init,
    Update,
    Custom,
}

impl RunMode {
    /// Argument / stdin-command keyword for this mode.
    pub fn keyword(self) -> &'static str {
        match self {
            RunMode::Init => "init",
            RunMode::Update => "update",
            RunMode::Custom => "custom",
        }
    }

    /// Result tag the wrapper emits when a call in this mode completes.
    pub fn result_tag(self) -> &'static str {
        match self {
            RunMode::Init => tags::INIT_RESULT,
            RunMode::Update => tags::UPDATE_RESULT,
            RunMode::Custom => tags::CUSTOM_RESULT,
        }
    }
}

/// A synchronous host-read request emitted by the subprocess.
///
/// Each variant corresponds to one HostAPI operation. The host must answer
/// with exactly one response line before the subprocess proceeds.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    GetVariable { name: String, default: String },
    ReadString { option: String, default: String },
    ReadStringFromSection { section: String, option: String, default: String },
    ReadDouble { option: String, default: f64 },
    ReadDoubleFromSection { section: String, option: String, default: f64 },
    ReadInt { option: String, default: i32 },
    ReadIntFromSection { section: String, option: String, default: i32 },
    GetMeasureName,
    GetSkinName,
    GetSkin,
    GetSkinWindow,
}

impl HostRequest {
    /// The response written back when the host-side operation fails, so the
    /// subprocess's blocking read never stalls.
    pub fn default_response(&self) -> String {
        match self {
            HostRequest::GetVariable { default, .. }
            | HostRequest::ReadString { default, .. }
            | HostRequest::ReadStringFromSection { default, .. } => default.clone(),
            HostRequest::ReadDouble { default, .. }
            | HostRequest::ReadDoubleFromSection { default, .. } => format_double(*default),
            HostRequest::ReadInt { default, .. }
            | HostRequest::ReadIntFromSection { default, .. } => default.to_string(),
            HostRequest::GetMeasureName
            | HostRequest::GetSkinName
            | HostRequest::GetSkin
            | HostRequest::GetSkinWindow => String::new(),
        }
    }
}

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Severity-tagged diagnostic text.
    Log(Severity, String),
    /// One-way host action; no response line is written.
    Execute(String),
    /// Synchronous host-read request.
    Request(HostRequest),
    /// Terminal result of the current call (stringified value, may be empty).
    Result(RunMode, String),
    /// Unmatched non-empty text, treated as plain diagnostic output.
    Plain(String),
    /// Blank line; consumers skip these.
    Empty,
}

/// Decode one raw line from the subprocess's stdout.
///
/// Matching is ordered longest-prefix-first within each tag family so that
/// e.g. `@@RM_READSTRINGFROMSECTION ` is never shadowed by `@@RM_READSTRING `
/// and `@@RM_GETSKINNAME` is never shadowed by `@@RM_GETSKIN`.
pub fn decode(raw: &str) -> Line {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Line::Empty;
    }

    for (tag, severity) in [
        (tags::LOG_NOTICE, Severity::Notice),
        (tags::LOG_WARNING, Severity::Warning),
        (tags::LOG_DEBUG, Severity::Debug),
        (tags::LOG_ERROR, Severity::Error),
    ] {
        if let Some(rest) = trimmed.strip_prefix(tag) {
            return Line::Log(severity, rest.to_string());
        }
    }

    if let Some(rest) = trimmed.strip_prefix(tags::EXECUTE) {
        return Line::Execute(rest.to_string());
    }

    if let Some(request) = decode_request(trimmed) {
        return Line::Request(request);
    }

    for (tag, mode) in [
        (tags::INIT_RESULT, RunMode::Init),
        (tags::UPDATE_RESULT, RunMode::Update),
        (tags::CUSTOM_RESULT, RunMode::Custom),
    ] {
        if let Some(rest) = trimmed.strip_prefix(tag) {
            return Line::Result(mode, rest.to_string());
        }
    }
    // A result tag with no payload at all still counts, the trailing space
    // is eaten by the trim above.
    for (tag, mode) in [
        ("@@INIT_RESULT", RunMode::Init),
        ("@@UPDATE_RESULT", RunMode::Update),
        ("@@CUSTOM_RESULT", RunMode::Custom),
    ] {
        if trimmed == tag {
            return Line::Result(mode, String::new());
        }
    }

    Line::Plain(trimmed.to_string())
}

fn decode_request(trimmed: &str) -> Option<HostRequest> {
    if let Some(rest) = trimmed.strip_prefix(tags::GET_VARIABLE) {
        let (name, default) = split2(rest);
        return Some(HostRequest::GetVariable { name, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_STRING_FROM_SECTION) {
        let (section, option, default) = split3(rest);
        return Some(HostRequest::ReadStringFromSection { section, option, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_STRING) {
        let (option, default) = split2(rest);
        return Some(HostRequest::ReadString { option, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_DOUBLE_FROM_SECTION) {
        let (section, option, default) = split3(rest);
        let default = default.trim().parse().unwrap_or(0.0);
        return Some(HostRequest::ReadDoubleFromSection { section, option, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_DOUBLE) {
        let (option, default) = split2(rest);
        let default = default.trim().parse().unwrap_or(0.0);
        return Some(HostRequest::ReadDouble { option, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_INT_FROM_SECTION) {
        let (section, option, default) = split3(rest);
        let default = default.trim().parse().unwrap_or(0);
        return Some(HostRequest::ReadIntFromSection { section, option, default });
    }
    if let Some(rest) = trimmed.strip_prefix(tags::READ_INT) {
        let (option, default) = split2(rest);
        let default = default.trim().parse().unwrap_or(0);
        return Some(HostRequest::ReadInt { option, default });
    }
    if trimmed.starts_with(tags::GET_MEASURE_NAME) {
        return Some(HostRequest::GetMeasureName);
    }
    if trimmed.starts_with(tags::GET_SKIN_NAME) {
        return Some(HostRequest::GetSkinName);
    }
    if trimmed.starts_with(tags::GET_SKIN_WINDOW) {
        return Some(HostRequest::GetSkinWindow);
    }
    if trimmed.starts_with(tags::GET_SKIN) {
        return Some(HostRequest::GetSkin);
    }
    None
}

/// Split `|`-delimited args into at most two parts; missing parts are empty.
fn split2(rest: &str) -> (String, String) {
    let mut it = rest.splitn(2, '|');
    let a = it.next().unwrap_or("").to_string();
    let b = it.next().unwrap_or("").to_string();
    (a, b)
}

/// Split `|`-delimited args into at most three parts; missing parts are empty.
fn split3(rest: &str) -> (String, String, String) {
    let mut it = rest.splitn(3, '|');
    let a = it.next().unwrap_or("").to_string();
    let b = it.next().unwrap_or("").to_string();
    let c = it.next().unwrap_or("").to_string();
    (a, b, c)
}

/// Encode a result line as the wrapper would emit it.
pub fn encode_result(mode: RunMode, payload: &str) -> String {
    format!("{}{}\n", mode.result_tag(), payload)
}

/// Encode a severity-tagged log line.
pub fn encode_log(severity: Severity, message: &str) -> String {
    format!("{}{}\n", severity.tag(), message)
}

/// Format a double the way the wire expects: no exponent for ordinary
/// magnitudes, no trailing `.0` on integral values.
pub fn format_double(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Parse a result payload as a numeric value. Empty or non-numeric payloads
/// yield `None` and leave the caller's numeric cache untouched.
pub fn parse_numeric(payload: &str) -> Option<f64> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_log_lines() {
        assert_eq!(
            decode("@@LOG_NOTICE hello"),
            Line::Log(Severity::Notice, "hello".to_string())
        );
        assert_eq!(
            decode("  @@LOG_ERROR boom  "),
            Line::Log(Severity::Error, "boom".to_string())
        );
    }

    #[test]
    fn decodes_execute_as_one_way() {
        assert_eq!(
            decode("@@RM_EXECUTE [!Refresh]"),
            Line::Execute("[!Refresh]".to_string())
        );
    }

    #[test]
    fn section_variant_wins_over_plain_read() {
        assert_eq!(
            decode("@@RM_READSTRINGFROMSECTION Sec|Opt|def"),
            Line::Request(HostRequest::ReadStringFromSection {
                section: "Sec".to_string(),
                option: "Opt".to_string(),
                default: "def".to_string(),
            })
        );
        assert_eq!(
            decode("@@RM_READSTRING Opt|def"),
            Line::Request(HostRequest::ReadString {
                option: "Opt".to_string(),
                default: "def".to_string(),
            })
        );
    }

    #[test]
    fn skin_name_wins_over_skin() {
        assert_eq!(
            decode("@@RM_GETSKINNAME"),
            Line::Request(HostRequest::GetSkinName)
        );
        assert_eq!(
            decode("@@RM_GETSKINWINDOW"),
            Line::Request(HostRequest::GetSkinWindow)
        );
        assert_eq!(decode("@@RM_GETSKIN"), Line::Request(HostRequest::GetSkin));
    }

    #[test]
    fn malformed_numeric_default_falls_back_to_zero() {
        assert_eq!(
            decode("@@RM_READDOUBLE Scale|not-a-number"),
            Line::Request(HostRequest::ReadDouble {
                option: "Scale".to_string(),
                default: 0.0,
            })
        );
        assert_eq!(
            decode("@@RM_READINT Count"),
            Line::Request(HostRequest::ReadInt {
                option: "Count".to_string(),
                default: 0,
            })
        );
    }

    #[test]
    fn default_may_contain_delimiter() {
        // splitn(2) keeps everything after the first pipe in the default
        assert_eq!(
            decode("@@RM_READSTRING Opt|a|b"),
            Line::Request(HostRequest::ReadString {
                option: "Opt".to_string(),
                default: "a|b".to_string(),
            })
        );
    }

    #[test]
    fn decodes_results_per_mode() {
        assert_eq!(
            decode("@@INIT_RESULT 42"),
            Line::Result(RunMode::Init, "42".to_string())
        );
        assert_eq!(
            decode("@@UPDATE_RESULT "),
            Line::Result(RunMode::Update, String::new())
        );
        assert_eq!(
            decode("@@CUSTOM_RESULT done"),
            Line::Result(RunMode::Custom, "done".to_string())
        );
    }

    #[test]
    fn bare_result_tag_is_empty_payload() {
        assert_eq!(decode("@@INIT_RESULT"), Line::Result(RunMode::Init, String::new()));
    }

    #[test]
    fn unmatched_lines_are_plain() {
        assert_eq!(decode("just some output"), Line::Plain("just some output".to_string()));
        assert_eq!(decode("@@UNKNOWN_TAG x"), Line::Plain("@@UNKNOWN_TAG x".to_string()));
        assert_eq!(decode("   "), Line::Empty);
    }

    #[test]
    fn default_responses_match_declared_defaults() {
        let req = HostRequest::ReadDouble {
            option: "Scale".to_string(),
            default: 1.5,
        };
        assert_eq!(req.default_response(), "1.5");

        let req = HostRequest::ReadInt {
            option: "Count".to_string(),
            default: 7,
        };
        assert_eq!(req.default_response(), "7");

        let req = HostRequest::GetVariable {
            name: "Foo".to_string(),
            default: "fallback".to_string(),
        };
        assert_eq!(req.default_response(), "fallback");

        assert_eq!(HostRequest::GetSkin.default_response(), "");
    }

    #[test]
    fn double_formatting_is_wire_friendly() {
        assert_eq!(format_double(2.0), "2");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(-3.0), "-3");
    }

    #[test]
    fn numeric_payload_parsing() {
        assert_eq!(parse_numeric("42"), Some(42.0));
        assert_eq!(parse_numeric(" 3.5 "), Some(3.5));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("abc"), None);
    }

    #[test]
    fn encode_appends_newline() {
        assert_eq!(encode_result(RunMode::Update, "5"), "@@UPDATE_RESULT 5\n");
        assert_eq!(encode_log(Severity::Warning, "w"), "@@LOG_WARNING w\n");
    }
}
