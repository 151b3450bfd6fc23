pub mod cascade_resolver;
pub mod cascade_smile_detector;
mod cascade_xml;
pub mod haar_cascade;
pub mod integral_image;
pub mod multi_scale;
