pub mod voice_buffer;
