pub mod bus;
pub mod db;
