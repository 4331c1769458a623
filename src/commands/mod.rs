pub mod menu;
pub mod orders;
pub mod revenue;
pub mod staff;
pub mod tables;
