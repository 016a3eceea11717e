use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_samples: usize,
}

#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    pub url: String,
    pub subject_prefix: String,
    pub outbound_queue_frames: usize,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "buildify-voice".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,
                frame_samples: 4096,
            },
            transport: TransportConfig {
                url: "nats://localhost:4222".to_string(),
                subject_prefix: "voice".to_string(),
                outbound_queue_frames: 8,
            },
        }
    }
}
