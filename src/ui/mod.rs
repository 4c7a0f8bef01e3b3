//! egui rendering. Widgets never mutate state directly; they push [`Action`]s
//! that the app applies once the frame is drawn.

pub mod panels;
pub mod plot;
pub mod preview;

use crate::state::WorkspaceEvent;

#[derive(Debug)]
pub enum Action {
    OpenFile,
    SelectDataset(String),
    DeleteDataset(String),
    Workspace(WorkspaceEvent),
}

impl From<WorkspaceEvent> for Action {
    fn from(event: WorkspaceEvent) -> Self {
        Action::Workspace(event)
    }
}
