pub mod constraints;
pub mod decoder;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod host;
pub mod instruction;
pub mod options;
pub mod pending;
pub mod replay;
pub mod session;
pub mod tracer;

pub use constraints::{PathConstraint, PathConstraints};
pub use dispatcher::{DebugEvent, Dispatcher};
pub use engine::{Engine, Register, ShadowEngine};
pub use error::{EngineError, OptionsError, ReplayError, TraceError};
pub use host::{Answer, Color, Debugger, Registers};
pub use instruction::{Instruction, Operand, OperandKind, SymbolicId, ThreadId};
pub use options::Options;
pub use pending::{HitContext, PendingAction, PendingActions};
pub use session::{RuntimeTrigger, SessionState};
pub use tracer::{TraceOutcome, Tracer};

use std::fs::{read, File};
use std::io::Write;
use std::path::PathBuf;

use log::info;
use serde_json::to_string_pretty;

use replay::{replay, MemoryImage, Script};

/// Where the replayed process memory comes from.
pub enum ImageSource {
    Flat { path: PathBuf, base: u64 },
    Elf(PathBuf),
}

pub fn run(
    script_path: PathBuf,
    image: ImageSource,
    options: Options,
    output: Option<PathBuf>,
    progress: bool,
) -> Result<(), ReplayError> {
    let script = Script::from_file(&script_path)?;

    let image = match image {
        ImageSource::Flat { path, base } => MemoryImage::flat(base, read(path)?)?,
        ImageSource::Elf(path) => MemoryImage::from_elf(&read(path)?)?,
    };
    for segment in image.segments() {
        info!("mapped {}", segment);
    }

    let report = replay(&script, image, options, progress);
    let json = to_string_pretty(&report)?;

    if let Some(path) = output {
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
    } else {
        print!("{}", json);
    }
    Ok(())
}
