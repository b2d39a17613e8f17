pub mod clipboard;
pub mod expand;
pub mod icons;
pub mod overlay;
pub mod paste;
pub mod text;
