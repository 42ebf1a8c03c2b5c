pub mod image_record;
pub mod stream_event;
