pub mod alignment;
pub mod span;

// re-export for cleaner imports
pub use self::alignment::SamAlignment;
pub use self::span::Span;
