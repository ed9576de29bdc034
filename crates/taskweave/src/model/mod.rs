mod draft;
mod event;
mod task;

pub use draft::{DueDate, ExtractionMethod, TaskDraft, UNASSIGNED};
pub use event::{Event, EventSource};
pub use task::{Priority, ProjectScope, Task, TaskStatus};
