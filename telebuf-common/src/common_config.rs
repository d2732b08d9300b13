use std::env;
use std::str::FromStr;

use log::{info, warn};
use once_cell::sync::Lazy;

pub struct BufferConfig {
    /// Slots per variable when a buffer is created without an explicit size.
    pub initial_buffer_size: usize,
    /// Index step per playback tick.
    pub playback_step: usize,
    /// Period of the buffer manager's tick.
    pub tick_micros: u64,
    /// How often consumer threads poll their handles.
    pub poll_micros: u64,
}

pub static CONFIG: Lazy<BufferConfig> = Lazy::new(buffer_config);

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("[buffer_config] ignoring {key}={raw:?}, not a valid number");
                default
            }
        },
        Err(_) => default,
    }
}

fn buffer_config() -> BufferConfig {
    let initial_buffer_size = env_or("TELEBUF_BUFFER_SIZE", 8192usize).max(1);
    let playback_step = env_or("TELEBUF_PLAYBACK_STEP", 1usize).max(1);
    let tick_micros = env_or("TELEBUF_TICK_MICROS", 1_000u64);
    let poll_micros = env_or("TELEBUF_POLL_MICROS", 5_000u64);

    info!("[buffer_config] initial_buffer_size: {initial_buffer_size}");
    info!("[buffer_config] playback_step: {playback_step}");
    info!("[buffer_config] tick_micros: {tick_micros}");
    info!("[buffer_config] poll_micros: {poll_micros}");

    BufferConfig {
        initial_buffer_size,
        playback_step,
        tick_micros,
        poll_micros,
    }
}
