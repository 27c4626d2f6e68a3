pub mod dispatch;
pub mod tenant;
