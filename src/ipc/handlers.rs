pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod exams;
pub mod marks;
pub mod students;
