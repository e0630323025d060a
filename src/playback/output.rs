//! Live output of a [`SynthBus`] through the default audio device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use super::synth::SynthBus;
use super::PlaybackError;

fn output_error(err: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Output(err.to_string())
}

/// An open output stream. Audio stops when this is dropped.
pub struct AudioOutput {
    _stream: cpal::Stream,
    bus: SynthBus,
}

impl AudioOutput {
    /// Open the default output device and a bus running at its sample rate.
    pub fn open_default() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| output_error("no output device available"))?;
        let supported = device.default_output_config().map_err(output_error)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;

        let bus = SynthBus::new(config.sample_rate.0);
        let render_bus = bus.clone();
        let mut mono: Vec<f32> = Vec::new();
        let err_fn = |err| warn!("Audio output error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels, 0.0);
                    render_bus.render(&mut mono);
                    for (frame, sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(*sample);
                    }
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels, 0.0);
                    render_bus.render(&mut mono);
                    for (frame, sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill((*sample * i16::MAX as f32) as i16);
                    }
                },
                err_fn,
                None,
            ),
            other => return Err(output_error(format!("unsupported sample format {other:?}"))),
        }
        .map_err(output_error)?;
        stream.play().map_err(output_error)?;

        info!(
            "Audio output on {:?}: {} Hz, {} channels",
            device.name().unwrap_or_default(),
            config.sample_rate.0,
            channels
        );
        Ok(Self {
            _stream: stream,
            bus,
        })
    }

    pub fn bus(&self) -> &SynthBus {
        &self.bus
    }
}
