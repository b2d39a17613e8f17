pub mod colors;
pub mod controls;
pub mod history;
pub mod layers;
