pub mod session_reader;
