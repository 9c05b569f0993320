//! The lifecycle front end of one measure instance.
//!
//! A [`Measure`] moves through `Uninitialized -> Initializing -> Initialized`
//! and owns the wrapper artifact and persistent process for its script.
//! Update runs asynchronously with a single-flight gate; bangs and custom
//! calls run synchronously within the command budget. Every degraded path
//! reports the last cached value instead of an error.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rainode_host::HostApi;
use rainode_protocol::{RunMode, Severity};
use rainode_wrapper::{build_call_expression, ScriptSource};

use crate::instance::{CachedValues, CancelToken, InstanceId, LifecycleState};
use crate::process::{run_transient, PersistentProcess, ProcessHandle, SendOutcome};
use crate::BridgeSettings;

/// State guarded by the lifecycle lock. The value cache has its own lock so
/// readers never wait behind a reload.
struct LifecycleData {
    source: Option<ScriptSource>,
    wrapper_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    process: Option<PersistentProcess>,
    cancel: CancelToken,
    force_reload: bool,
}

pub struct Measure {
    id: InstanceId,
    api: Arc<dyn HostApi>,
    settings: BridgeSettings,
    state_flag: AtomicU8,
    lifecycle: Mutex<LifecycleData>,
    values: Arc<Mutex<CachedValues>>,
    update_in_flight: Arc<AtomicBool>,
}

impl Measure {
    pub(crate) fn new(id: InstanceId, api: Arc<dyn HostApi>, settings: BridgeSettings) -> Self {
        Self {
            id,
            api,
            settings,
            state_flag: AtomicU8::new(LifecycleState::Uninitialized as u8),
            lifecycle: Mutex::new(LifecycleData {
                source: None,
                wrapper_path: None,
                working_dir: None,
                process: None,
                cancel: CancelToken::new(),
                force_reload: false,
            }),
            values: Arc::new(Mutex::new(CachedValues::default())),
            update_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state_flag.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state_flag.store(state as u8, Ordering::SeqCst);
    }

    /// The last known numeric value. Never blocks on subprocess I/O.
    pub fn value(&self) -> f64 {
        self.values.lock().map(|v| v.number()).unwrap_or(0.0)
    }

    /// The last known string value, when the script produced a non-empty
    /// one. Callers render the numeric value otherwise.
    pub fn string_value(&self) -> Option<String> {
        self.values.lock().ok().and_then(|v| v.string())
    }

    /// Path of the wrapper artifact currently on disk, if any.
    pub fn wrapper_path(&self) -> Option<PathBuf> {
        self.lifecycle
            .lock()
            .ok()
            .and_then(|lifecycle| lifecycle.wrapper_path.clone())
    }

    /// Request a full teardown and restart on the next `reload`, even when
    /// the script identity is unchanged.
    pub fn force_reload(&self) {
        if let Ok(mut lifecycle) = self.lifecycle.lock() {
            lifecycle.force_reload = true;
        }
    }

    /// (Re)configure the instance with a script source.
    ///
    /// Unchanged script identity on an initialized instance is a no-op.
    /// Any change tears down the previous wrapper and process before the
    /// new script initializes.
    pub fn reload(&self, source: Option<ScriptSource>) {
        let Ok(mut lifecycle) = self.lifecycle.lock() else {
            return;
        };

        let unchanged = self.state() == LifecycleState::Initialized
            && !lifecycle.force_reload
            && lifecycle.source == source;
        if unchanged {
            return;
        }
        lifecycle.force_reload = false;

        self.teardown_locked(&mut lifecycle);

        let Some(source) = source.filter(|s| !s.is_empty()) else {
            lifecycle.source = None;
            self.api.log(
                Severity::Error,
                "no script configured; set a script file or inline lines",
            );
            return;
        };

        self.set_state(LifecycleState::Initializing);

        let wrapper_text = rainode_wrapper::generate(&source);
        let wrapper = match rainode_wrapper::write_to_temp(&wrapper_text) {
            Ok(path) => path,
            Err(err) => {
                self.api.log(Severity::Error, &err.to_string());
                lifecycle.source = None;
                self.set_state(LifecycleState::Uninitialized);
                return;
            }
        };

        lifecycle.working_dir = source.working_dir();
        lifecycle.source = Some(source);
        lifecycle.wrapper_path = Some(wrapper);
        lifecycle.cancel = CancelToken::new();

        match self.ensure_process_locked(&mut lifecycle) {
            Some(handle) => {
                let outcome =
                    handle.send_command(RunMode::Init, "init", &lifecycle.cancel, &self.settings);
                match outcome {
                    SendOutcome::Completed(payload) => self.apply_payload(&payload),
                    SendOutcome::TimedOut => self.api.log(
                        Severity::Warning,
                        "initialize did not finish in time; continuing",
                    ),
                    SendOutcome::Cancelled => {
                        self.set_state(LifecycleState::Uninitialized);
                        return;
                    }
                    SendOutcome::Broken => {
                        self.fallback_locked(&lifecycle, RunMode::Init, None);
                    }
                }
            }
            None => {
                self.fallback_locked(&lifecycle, RunMode::Init, None);
            }
        }

        self.set_state(LifecycleState::Initialized);
    }

    /// Run one update cycle and report the freshest value available.
    ///
    /// The cycle itself runs on a background thread; if the previous cycle
    /// is still in flight this one is dropped, not queued. Before
    /// initialization completes this performs no subprocess I/O at all.
    pub fn update(&self) -> f64 {
        if self.state() != LifecycleState::Initialized {
            return self.value();
        }
        if self
            .update_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.api
                .log(Severity::Debug, "update still in flight; skipping cycle");
            return self.value();
        }

        let (handle, cancel, wrapper, working_dir) = match self.lifecycle.lock() {
            Ok(mut lifecycle) => (
                self.ensure_process_locked(&mut lifecycle),
                lifecycle.cancel.clone(),
                lifecycle.wrapper_path.clone(),
                lifecycle.working_dir.clone(),
            ),
            Err(_) => {
                self.update_in_flight.store(false, Ordering::SeqCst);
                return self.value();
            }
        };

        let api = Arc::clone(&self.api);
        let values = Arc::clone(&self.values);
        let settings = self.settings.clone();
        let in_flight = Arc::clone(&self.update_in_flight);
        std::thread::spawn(move || {
            let outcome = match handle {
                Some(handle) => handle.send_command(RunMode::Update, "update", &cancel, &settings),
                None => SendOutcome::Broken,
            };
            match outcome {
                SendOutcome::Completed(payload) => {
                    // A teardown may have reset the cache while this cycle
                    // was landing; its result must not come back.
                    if !cancel.is_cancelled() {
                        if let Ok(mut cache) = values.lock() {
                            cache.apply(&payload);
                        }
                    }
                }
                SendOutcome::TimedOut => {
                    api.log(Severity::Debug, "update still running; reporting last value");
                }
                SendOutcome::Cancelled => {}
                SendOutcome::Broken => {
                    if let Some(wrapper) = wrapper {
                        if !cancel.is_cancelled() {
                            let result = run_transient(
                                &settings,
                                &wrapper,
                                RunMode::Update,
                                None,
                                working_dir.as_deref(),
                                &api,
                            );
                            if let Some(payload) = result {
                                if !cancel.is_cancelled() {
                                    if let Ok(mut cache) = values.lock() {
                                        cache.apply(&payload);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            in_flight.store(false, Ordering::SeqCst);
        });

        self.value()
    }

    /// Run a bang: a custom call whose result updates the cached values.
    pub fn execute_bang(&self, args: &str) {
        if self.state() != LifecycleState::Initialized {
            self.api
                .log(Severity::Warning, "script not initialized; bang ignored");
            return;
        }
        let expr = build_call_expression(args);
        if expr.is_empty() {
            return;
        }
        if let Some(payload) = self.run_custom(&expr) {
            self.apply_payload(&payload);
        }
    }

    /// Run a custom call and return its stringified result. Unlike a bang
    /// this leaves the cached values alone.
    pub fn call(&self, args: &[String]) -> Option<String> {
        if self.state() != LifecycleState::Initialized {
            self.api
                .log(Severity::Warning, "script not initialized; call ignored");
            return None;
        }
        let expr = build_call_expression(&args.join(" "));
        if expr.is_empty() {
            return None;
        }
        self.run_custom(&expr)
    }

    /// Tear everything down: cancel in-flight waits, stop the process,
    /// delete the wrapper artifact, reset cached values.
    pub fn finalize(&self) {
        if let Ok(mut lifecycle) = self.lifecycle.lock() {
            self.teardown_locked(&mut lifecycle);
            lifecycle.source = None;
        }
    }

    fn run_custom(&self, expr: &str) -> Option<String> {
        let (handle, cancel, wrapper, working_dir) = match self.lifecycle.lock() {
            Ok(mut lifecycle) => (
                self.ensure_process_locked(&mut lifecycle),
                lifecycle.cancel.clone(),
                lifecycle.wrapper_path.clone(),
                lifecycle.working_dir.clone(),
            ),
            Err(_) => return None,
        };

        let outcome = handle
            .map(|h| h.send_command(RunMode::Custom, &format!("custom {expr}"), &cancel, &self.settings));
        match outcome {
            Some(SendOutcome::Completed(payload)) => Some(payload),
            Some(SendOutcome::TimedOut) => {
                self.api.log(
                    Severity::Warning,
                    &format!("custom call did not finish in time: {expr}"),
                );
                None
            }
            Some(SendOutcome::Cancelled) => None,
            Some(SendOutcome::Broken) | None => {
                if cancel.is_cancelled() {
                    return None;
                }
                run_transient(
                    &self.settings,
                    &wrapper?,
                    RunMode::Custom,
                    Some(expr),
                    working_dir.as_deref(),
                    &self.api,
                )
            }
        }
    }

    /// Return a live process handle, restarting the subprocess if the
    /// previous one exited.
    fn ensure_process_locked(&self, lifecycle: &mut LifecycleData) -> Option<ProcessHandle> {
        if let Some(process) = lifecycle.process.as_mut() {
            if process.is_running() {
                return Some(process.handle());
            }
            self.api
                .log(Severity::Warning, "script process exited; restarting");
            process.stop(Duration::ZERO);
            lifecycle.process = None;
        }

        let wrapper = lifecycle.wrapper_path.clone()?;
        match PersistentProcess::spawn(
            &self.settings,
            &wrapper,
            lifecycle.working_dir.as_deref(),
            Arc::clone(&self.api),
            Arc::clone(&self.values),
        ) {
            Ok(process) => {
                let handle = process.handle();
                lifecycle.process = Some(process);
                Some(handle)
            }
            Err(err) => {
                self.api.log(Severity::Error, &err.to_string());
                None
            }
        }
    }

    fn fallback_locked(&self, lifecycle: &LifecycleData, mode: RunMode, call: Option<&str>) {
        let Some(wrapper) = lifecycle.wrapper_path.as_deref() else {
            return;
        };
        if lifecycle.cancel.is_cancelled() {
            return;
        }
        let result = run_transient(
            &self.settings,
            wrapper,
            mode,
            call,
            lifecycle.working_dir.as_deref(),
            &self.api,
        );
        if let Some(payload) = result {
            self.apply_payload(&payload);
        }
    }

    fn teardown_locked(&self, lifecycle: &mut LifecycleData) {
        lifecycle.cancel.cancel();
        if let Some(mut process) = lifecycle.process.take() {
            process.stop(self.settings.kill_grace);
        }
        if let Some(wrapper) = lifecycle.wrapper_path.take() {
            rainode_wrapper::remove_wrapper(&wrapper);
        }
        if let Ok(mut cache) = self.values.lock() {
            cache.reset();
        }
        self.update_in_flight.store(false, Ordering::SeqCst);
        self.set_state(LifecycleState::Uninitialized);
    }

    fn apply_payload(&self, payload: &str) {
        if let Ok(mut cache) = self.values.lock() {
            cache.apply(payload);
        }
    }
}

impl Drop for Measure {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rainode_host::{HostConfig, StaticHost};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("node");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn stub_measure(dir: &Path, body: &str) -> Measure {
        let stub = write_stub(dir, body);
        let settings = BridgeSettings {
            node_command: stub,
            command_budget: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            kill_grace: Duration::from_millis(200),
        };
        Measure::new(
            InstanceId(1),
            Arc::new(StaticHost::new(HostConfig::default())),
            settings,
        )
    }

    fn script_source(dir: &Path) -> ScriptSource {
        let path = dir.join("script.js");
        std::fs::write(&path, "function update() { return 42; }\n").unwrap();
        ScriptSource::File(path)
    }

    const COUNTING_STUB: &str = r#"
echo spawned >> "$(dirname "$0")/spawns.log"
while read cmd; do
  case "$cmd" in
    init) echo "@@INIT_RESULT 1" ;;
    update) echo "@@UPDATE_RESULT 42" ;;
    custom*) echo "@@CUSTOM_RESULT 5" ;;
  esac
done
"#;

    fn spawn_count(dir: &Path) -> usize {
        std::fs::read_to_string(dir.join("spawns.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn reload_initializes_and_caches_the_init_result() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        assert_eq!(measure.state(), LifecycleState::Uninitialized);

        measure.reload(Some(script_source(dir.path())));
        assert_eq!(measure.state(), LifecycleState::Initialized);
        assert_eq!(measure.value(), 1.0);
    }

    #[test]
    fn unchanged_reload_spawns_no_second_process() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        let source = script_source(dir.path());

        measure.reload(Some(source.clone()));
        measure.reload(Some(source));
        assert_eq!(spawn_count(dir.path()), 1);
    }

    #[test]
    fn forced_reload_restarts_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        let source = script_source(dir.path());

        measure.reload(Some(source.clone()));
        measure.force_reload();
        measure.reload(Some(source));
        assert_eq!(spawn_count(dir.path()), 2);
        assert_eq!(measure.state(), LifecycleState::Initialized);
    }

    #[test]
    fn update_reports_the_new_value_once_the_cycle_lands() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.reload(Some(script_source(dir.path())));

        measure.update();
        // The cycle runs on a background thread.
        for _ in 0..100 {
            if measure.value() == 42.0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(measure.value(), 42.0);
        assert_eq!(measure.string_value().as_deref(), Some("42"));
    }

    #[test]
    fn update_before_reload_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        assert_eq!(measure.update(), 0.0);
        assert_eq!(spawn_count(dir.path()), 0);
    }

    #[test]
    fn slow_update_degrades_to_the_cached_value() {
        let dir = tempfile::tempdir().unwrap();
        let stub_body = r#"
echo spawned >> "$(dirname "$0")/spawns.log"
while read cmd; do
  case "$cmd" in
    init) echo "@@INIT_RESULT 7" ;;
    update) sleep 2 ;;
  esac
done
"#;
        let stub = write_stub(dir.path(), stub_body);
        let settings = BridgeSettings {
            node_command: stub,
            command_budget: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            kill_grace: Duration::from_millis(100),
        };
        let measure = Measure::new(
            InstanceId(2),
            Arc::new(StaticHost::new(HostConfig::default())),
            settings,
        );
        measure.reload(Some(script_source(dir.path())));
        assert_eq!(measure.value(), 7.0);

        assert_eq!(measure.update(), 7.0);
        std::thread::sleep(Duration::from_millis(250));
        // Timed out; the init value stays.
        assert_eq!(measure.value(), 7.0);
        assert_eq!(measure.state(), LifecycleState::Initialized);
    }

    #[test]
    fn bang_result_updates_cached_values() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.reload(Some(script_source(dir.path())));

        measure.execute_bang("inc 2");
        assert_eq!(measure.value(), 5.0);
    }

    #[test]
    fn call_returns_the_result_without_touching_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.reload(Some(script_source(dir.path())));
        assert_eq!(measure.value(), 1.0);

        let result = measure.call(&["inc".to_string(), "2".to_string()]);
        assert_eq!(result.as_deref(), Some("5"));
        assert_eq!(measure.value(), 1.0);
    }

    #[test]
    fn bang_before_initialization_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.execute_bang("inc 2");
        assert_eq!(spawn_count(dir.path()), 0);
    }

    #[test]
    fn finalize_resets_values_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.reload(Some(script_source(dir.path())));
        assert_eq!(measure.value(), 1.0);

        let wrapper = measure.wrapper_path().unwrap();
        assert!(wrapper.exists());

        measure.finalize();
        assert_eq!(measure.state(), LifecycleState::Uninitialized);
        assert_eq!(measure.value(), 0.0);
        assert_eq!(measure.string_value(), None);
        assert!(!wrapper.exists());
        assert_eq!(measure.wrapper_path(), None);
    }

    #[test]
    fn finalize_during_an_update_never_resurrects_the_result() {
        let dir = tempfile::tempdir().unwrap();
        // The update answer arrives only after finalize has torn down.
        let stub_body = r#"
while read cmd; do
  case "$cmd" in
    init) echo "@@INIT_RESULT 7" ;;
    update) sleep 0.3; echo "@@UPDATE_RESULT 99" ;;
  esac
done
"#;
        let stub = write_stub(dir.path(), stub_body);
        let settings = BridgeSettings {
            node_command: stub,
            command_budget: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(10),
            kill_grace: Duration::from_millis(100),
        };
        let measure = Measure::new(
            InstanceId(3),
            Arc::new(StaticHost::new(HostConfig::default())),
            settings,
        );
        measure.reload(Some(script_source(dir.path())));
        assert_eq!(measure.value(), 7.0);

        measure.update();
        std::thread::sleep(Duration::from_millis(50));
        measure.finalize();

        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(measure.value(), 0.0);
        assert_eq!(measure.string_value(), None);
    }

    #[test]
    fn missing_script_leaves_the_instance_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let measure = stub_measure(dir.path(), COUNTING_STUB);
        measure.reload(None);
        assert_eq!(measure.state(), LifecycleState::Uninitialized);

        measure.reload(Some(ScriptSource::Inline(vec!["  ".to_string()])));
        assert_eq!(measure.state(), LifecycleState::Uninitialized);
        assert_eq!(spawn_count(dir.path()), 0);
    }

    fn node_available() -> bool {
        std::process::Command::new("node")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    // Runs the real generated wrapper under node; skipped when node is not
    // installed.
    #[test]
    fn custom_result_echoes_through_updates_without_an_update_export() {
        if !node_available() {
            eprintln!("node not found; skipping");
            return;
        }
        let settings = BridgeSettings {
            command_budget: Duration::from_secs(5),
            ..BridgeSettings::default()
        }
        .locate_interpreter()
        .unwrap();
        let measure = Measure::new(
            InstanceId(4),
            Arc::new(StaticHost::new(HostConfig::default())),
            settings,
        );
        measure.reload(Some(ScriptSource::Inline(vec![
            "function inc() { return 5; }".to_string(),
        ])));
        assert_eq!(measure.state(), LifecycleState::Initialized);

        // The call leaves the cache alone, so the 5 below can only arrive
        // through the update echoing the last result.
        assert_eq!(measure.call(&["inc".to_string()]).as_deref(), Some("5"));
        assert_eq!(measure.value(), 0.0);

        measure.update();
        for _ in 0..100 {
            if measure.value() == 5.0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(measure.value(), 5.0);
        assert_eq!(measure.string_value().as_deref(), Some("5"));
    }

    #[test]
    fn dead_process_is_restarted_on_the_next_call() {
        let dir = tempfile::tempdir().unwrap();
        // Exits after answering one command.
        let stub_body = r#"
echo spawned >> "$(dirname "$0")/spawns.log"
read cmd
case "$cmd" in
  init) echo "@@INIT_RESULT 1" ;;
  update) echo "@@UPDATE_RESULT 42" ;;
  custom*) echo "@@CUSTOM_RESULT 5" ;;
esac
"#;
        let measure = stub_measure(dir.path(), stub_body);
        measure.reload(Some(script_source(dir.path())));
        assert_eq!(spawn_count(dir.path()), 1);

        // First process answered init and exited; the bang restarts.
        std::thread::sleep(Duration::from_millis(100));
        measure.execute_bang("inc");
        assert!(spawn_count(dir.path()) >= 2);
        assert_eq!(measure.value(), 5.0);
    }
}
