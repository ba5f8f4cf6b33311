pub mod core;
pub mod exams;
pub mod rooms;
pub mod seating;
pub mod students;
