//! ValueWriter: sink appending each received value as a line.

use crate::model::data::DataObject;
use crate::model::error::{ModelError, ModelResult};
use crate::model::process::{Process, ProcessContext, ProcessState, StepContext};
use crate::model::value::PropertyBag;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub struct ValueWriterProcess {
    state: ProcessState,
    /// Target selected by the last link; `None` keeps values in memory.
    target: Option<PathBuf>,
    writer: Option<(PathBuf, BufWriter<File>)>,
    input: Option<DataObject>,
    records: Vec<String>,
}

impl ValueWriterProcess {
    pub fn new() -> Self {
        let mut state = ProcessState::new(
            "NMValueWriter",
            PropertyBag::new().with("FileName", Vec::<String>::new()),
        );
        state.set_sink(true);
        Self {
            state,
            target: None,
            writer: None,
            input: None,
            records: Vec::new(),
        }
    }

    /// Lines written since the last reset.
    pub fn records(&self) -> &[String] {
        &self.records
    }

    fn write_line(&mut self, component: &str, path: PathBuf, line: &str) -> ModelResult<()> {
        let resource_error = |e: std::io::Error| ModelError::Resource {
            component: component.to_string(),
            message: format!("Failed to write '{}': {}", path.display(), e),
        };

        if self.writer.as_ref().map(|(p, _)| p != &path).unwrap_or(true) {
            self.close_resources();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(resource_error)?;
            self.writer = Some((path.clone(), BufWriter::new(file)));
        }
        if let Some((_, writer)) = self.writer.as_mut() {
            writeln!(writer, "{}", line).map_err(resource_error)?;
        }
        Ok(())
    }
}

impl Default for ValueWriterProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for ValueWriterProcess {
    fn state(&self) -> &ProcessState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProcessState {
        &mut self.state
    }

    fn link_parameters(&mut self, ctx: &StepContext<'_>) -> ModelResult<()> {
        self.target = match ctx.parameter(&self.state, "FileName") {
            Some(value) => value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            None => None,
        };
        Ok(())
    }

    fn set_nth_input(&mut self, idx: usize, input: DataObject) -> ModelResult<()> {
        if idx != 0 {
            return Err(ModelError::InvalidInput {
                component: self.state.type_name().to_string(),
                input: format!("#{} (writer takes a single input)", idx),
            });
        }
        self.input = Some(input);
        Ok(())
    }

    /// The last value written, passed through.
    fn output(&self, idx: usize) -> Option<DataObject> {
        if idx == 0 {
            self.input.clone()
        } else {
            None
        }
    }

    fn update(&mut self, ctx: &mut ProcessContext<'_>) -> ModelResult<()> {
        let input = self
            .input
            .clone()
            .ok_or_else(|| ModelError::UninitialisedDataObject {
                component: ctx.component().to_string(),
                message: "nothing to write".to_string(),
            })?;
        let line = input.to_string();
        if let Some(path) = self.target.clone() {
            self.write_line(ctx.component(), path, &line)?;
        }
        self.records.push(line);
        ctx.report_progress(1.0);
        Ok(())
    }

    fn close_resources(&mut self) {
        if let Some((path, mut writer)) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!("Failed to flush '{}': {}", path.display(), e);
            }
        }
    }

    fn reset(&mut self) {
        self.state.reset();
        self.close_resources();
        self.input = None;
        self.records.clear();
    }
}
