pub mod booking;
pub mod directory;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod queue;

pub use booking::RegistrationBookingService;
pub use directory::{PatientDirectory, SupabasePatientDirectory, UnverifiedPatientDirectory};
pub use ledger::SlotLedger;
pub use lifecycle::RegistrationLifecycleService;
pub use locks::{SlotGuard, SlotLockTable};
pub use queue::QueueAllocator;
