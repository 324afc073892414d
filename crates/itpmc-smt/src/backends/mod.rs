pub mod enumerative;
pub mod smtlib_printer;
pub mod z3_backend;
