use serde_derive::{Deserialize, Serialize};
use std::env::var;
use std::fs::read;
use std::path::Path;

use crate::error::OptionsError;
use crate::host::Color;

/// Environment variable holding the path of a JSON options file.
pub const OPTIONS_ENV: &str = "TAINTRACE_OPTIONS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
    pub show_debug_info: bool,
    pub show_extra_debug_info: bool,
    pub paint_executed_instructions: bool,
    pub add_comments_controlled_operands: bool,
    pub add_comments_symbolic_expressions: bool,
    pub rename_tainted_function_names: bool,
    pub use_tainting_engine: bool,
    pub use_symbolic_engine: bool,
    /// Ask before tracing more than this many instructions in trace mode.
    pub limit_instructions_tracing_mode: Option<u64>,
    pub color_tainted: Color,
    pub color_tainted_condition: Color,
    pub color_executed_instruction: Color,
    /// Step into after a pending action instead of continuing the process.
    pub step_into_when_tainting: bool,
    /// Disassembly that switches processor mode; auto-stepping steps over it.
    pub mode_switch_pattern: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            show_debug_info: true,
            show_extra_debug_info: false,
            paint_executed_instructions: false,
            add_comments_controlled_operands: true,
            add_comments_symbolic_expressions: false,
            rename_tainted_function_names: true,
            use_tainting_engine: true,
            use_symbolic_engine: false,
            limit_instructions_tracing_mode: Some(1000),
            color_tainted: 0x99ffcc,
            color_tainted_condition: 0xb8b8ff,
            color_executed_instruction: 0xfff0dc,
            step_into_when_tainting: true,
            mode_switch_pattern: "call dword ptr fs:[0xc0]".to_string(),
        }
    }
}

impl Options {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let data = read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Options from the file named by `TAINTRACE_OPTIONS`, or the defaults.
    pub fn from_env() -> Result<Self, OptionsError> {
        match var(OPTIONS_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// The instruction-count limit, if one is set. Zero means no limit.
    pub fn trace_limit(&self) -> Option<u64> {
        self.limit_instructions_tracing_mode.filter(|limit| *limit > 0)
    }
}
