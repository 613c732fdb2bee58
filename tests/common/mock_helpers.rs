//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use lumass_core::controller::ControllerState;
use lumass_core::model::{
    DataObject, ModelError, ModelResult, Process, ProcessContext, ProcessState, PropertyBag,
};
use lumass_core::ControllerEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared, ordered record of process lifecycle calls
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Number of `update:<label>` entries in the log
pub fn update_count(log: &CallLog, label: &str) -> usize {
    let entry = format!("update:{}", label);
    log.lock().unwrap().iter().filter(|e| **e == entry).count()
}

/// Create test channels with default size
pub fn create_test_channels<T, U>() -> (Sender<T>, Receiver<T>, Sender<U>, Receiver<U>) {
    let (tx1, rx1) = bounded(16);
    let (tx2, rx2) = bounded(16);
    (tx1, rx1, tx2, rx2)
}

/// The `StateChanged` transitions among `events`
pub fn state_changes(events: &[ControllerEvent]) -> Vec<ControllerState> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

/// Test process that records its lifecycle calls.
///
/// Its output is the sum of its scalar inputs plus one, so a chain of
/// recorders counts its own length.
pub struct RecordingProcess {
    state: ProcessState,
    label: String,
    log: CallLog,
    inputs: Vec<Option<DataObject>>,
    output: Option<DataObject>,
    updates: usize,
    fail_on: Option<usize>,
    panic_with: Option<String>,
    abort_once: Option<Arc<AtomicBool>>,
    block_until_abort: bool,
}

impl RecordingProcess {
    pub const TYPE_NAME: &'static str = "NMRecordingProcess";

    pub fn new(label: impl Into<String>, log: CallLog) -> Self {
        Self {
            state: ProcessState::new(Self::TYPE_NAME, PropertyBag::new()),
            label: label.into(),
            log,
            inputs: Vec::new(),
            output: None,
            updates: 0,
            fail_on: None,
            panic_with: None,
            abort_once: None,
            block_until_abort: false,
        }
    }

    /// Fail the `n`-th update of a run (1-based)
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    pub fn panicking(mut self, message: impl Into<String>) -> Self {
        self.panic_with = Some(message.into());
        self
    }

    /// Raise `flag` after the first successful update, once
    pub fn aborting(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort_once = Some(flag);
        self
    }

    /// Spin inside `update` until the run is aborted
    pub fn blocking(mut self) -> Self {
        self.block_until_abort = true;
        self
    }

    fn record(&self, call: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", call, self.label));
    }
}

impl Process for RecordingProcess {
    fn state(&self) -> &ProcessState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    fn set_nth_input(&mut self, idx: usize, input: DataObject) -> ModelResult<()> {
        if self.inputs.len() <= idx {
            self.inputs.resize(idx + 1, None);
        }
        self.inputs[idx] = Some(input);
        Ok(())
    }

    fn output(&self, idx: usize) -> Option<DataObject> {
        if idx == 0 {
            self.output.clone()
        } else {
            None
        }
    }

    fn update(&mut self, ctx: &mut ProcessContext<'_>) -> ModelResult<()> {
        self.updates += 1;
        self.record("update");

        if let Some(message) = &self.panic_with {
            panic!("{}", message);
        }
        if self.fail_on == Some(self.updates) {
            return Err(ModelError::Execution {
                component: ctx.component().to_string(),
                message: "boom".to_string(),
            });
        }
        if self.block_until_abort {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !ctx.is_aborted() {
                if Instant::now() > deadline {
                    return Err(ModelError::Execution {
                        component: ctx.component().to_string(),
                        message: "never aborted".to_string(),
                    });
                }
                ctx.report_progress(0.5);
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(ModelError::Aborted);
        }

        let sum: f64 = self
            .inputs
            .iter()
            .flatten()
            .filter_map(|d| d.as_scalar())
            .sum();
        self.output = Some(DataObject::scalar(sum + 1.0));

        if let Some(flag) = self.abort_once.take() {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn open_resources(&mut self) -> ModelResult<()> {
        self.record("open");
        Ok(())
    }

    fn close_resources(&mut self) {
        self.record("close");
    }

    fn reset(&mut self) {
        self.state.reset();
        self.inputs.clear();
        self.output = None;
        self.updates = 0;
    }
}
