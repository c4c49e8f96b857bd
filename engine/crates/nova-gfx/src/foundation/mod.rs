pub mod ash_device;
pub mod device;
pub mod headless;
pub mod recording_device;
