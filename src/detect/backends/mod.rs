pub mod contour;
pub mod scripted;

pub use contour::ContourDetector;
pub use scripted::ScriptedDetector;
