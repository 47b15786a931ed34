//! # Driven Ports
//!
//! Node-level effects of approved program proposals. The governance engine
//! only decides *when*; the node decides *how* (fetching a library, stopping
//! the process, swapping the binary).
//!
//! Testing: [`RecordingProgramControl`]

use shared_types::BlockHeight;

use crate::domain::LibSpec;

/// Receives program-level actions from governance.
pub trait ProgramControl {
    /// An approved ENI library reached its deployment point.
    fn deploy_lib(&mut self, lib: &LibSpec, height: BlockHeight);

    /// The node must stop producing blocks after `height`.
    fn schedule_retire(&mut self, height: BlockHeight);

    /// The node must switch to `lib` at `height`.
    fn schedule_upgrade(&mut self, lib: &LibSpec, height: BlockHeight);
}

/// One action received by [`RecordingProgramControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramEvent {
    Deployed { name: String, version: String, height: BlockHeight },
    Retire { height: BlockHeight },
    Upgrade { name: String, version: String, height: BlockHeight },
}

/// Adapter that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgramControl {
    pub events: Vec<ProgramEvent>,
}

impl RecordingProgramControl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgramControl for RecordingProgramControl {
    fn deploy_lib(&mut self, lib: &LibSpec, height: BlockHeight) {
        self.events.push(ProgramEvent::Deployed {
            name: lib.name.clone(),
            version: lib.version.clone(),
            height,
        });
    }

    fn schedule_retire(&mut self, height: BlockHeight) {
        self.events.push(ProgramEvent::Retire { height });
    }

    fn schedule_upgrade(&mut self, lib: &LibSpec, height: BlockHeight) {
        self.events.push(ProgramEvent::Upgrade {
            name: lib.name.clone(),
            version: lib.version.clone(),
            height,
        });
    }
}
