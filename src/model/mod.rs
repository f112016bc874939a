//! Domain records shared by the engines and the store

pub mod batch;
pub mod course;
pub mod credit;
pub mod fee_record;
pub mod student;

pub use batch::{Batch, BatchIdentity, BatchStatus, ScheduleEntry};
pub use course::{parse_level_code, CourseFee, CourseFeeTable, Level, Stage};
pub use credit::{CreditTransactionType, StudentCredit};
pub use fee_record::FeeRecord;
pub use student::{normalize_phone, AdminIdentity, IdentityAccount, Student};

pub type StudentId = uuid::Uuid;
pub type BatchId = uuid::Uuid;
pub type FeeRecordId = uuid::Uuid;
pub type CreditId = uuid::Uuid;
pub type AdminId = uuid::Uuid;
