pub mod error;
pub mod memory;
pub mod postgrest;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use traits::{AppointmentStore, DirectoryStore, ScheduleStore, SlotLockStore};
