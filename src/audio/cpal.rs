// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::mixer::Mixer;
use super::{Device as AudioDevice, DeviceError, PlaybackCommand, VoiceHandle};
use crate::config;

/// A cpal output device with a continuously running stream. The stream renders the mixer,
/// so the mixer clock is the device clock.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The number of output channels.
    channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The mixer rendered by the output stream.
    mixer: Mixer,
    /// Dropping this sender shuts the output thread down.
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

/// f32 callback: render the mixer directly into the cpal buffer.
fn create_f32_callback(
    mixer: Mixer,
    channels: usize,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.render(data, channels);
    }
}

/// Integer callback: render into a scratch buffer and convert.
fn create_converting_callback<T>(
    mixer: Mixer,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.render(&mut scratch, channels);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.mixer.clear();

        // Closing the channel wakes the output thread, which drops the stream.
        drop(self.shutdown_tx.take());
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Device {
    /// Lists the names of cpal output devices.
    pub fn list() -> Result<Vec<String>, DeviceError> {
        let mut devices: Vec<String> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to open host"
                    );
                    continue;
                }
            };
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let config = match device.default_output_config() {
                    Ok(config) => config,
                    Err(_) => continue,
                };
                devices.push(format!(
                    "{} (Channels={}) ({})",
                    device.name()?,
                    config.channels(),
                    host_id.name()
                ));
            }
        }

        devices.sort();
        Ok(devices)
    }

    /// Gets the given cpal device and starts its output stream. The name "default" selects the
    /// host's default output device.
    pub fn get(config: &config::Audio) -> Result<Device, DeviceError> {
        let name = config.device();
        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))?
        } else {
            host.output_devices()?
                .find(|device| device.name().is_ok_and(|n| n.trim() == name))
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))?
        };

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(sample_rate) = config.sample_rate() {
            stream_config.sample_rate = sample_rate;
        }

        let sample_rate: u32 = stream_config.sample_rate;
        let channels = stream_config.channels;
        let mixer = Mixer::new(sample_rate);

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);

        // The stream is not Send, so it is built and owned by the output thread.
        let output_thread = {
            let mixer = mixer.clone();
            thread::spawn(move || {
                let stream = match Device::build_stream(&device, &stream_config, sample_format, mixer)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Park until the device is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(DeviceError::OutputThread),
        }

        info!(
            device = name,
            sample_rate,
            channels,
            format = ?sample_format,
            "Output stream started"
        );

        Ok(Device {
            name: name.to_string(),
            channels,
            host_id: host.id(),
            mixer,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        mixer: Mixer,
    ) -> Result<cpal::Stream, DeviceError> {
        let channels = config.channels as usize;
        let err_fn = |err| error!("CPAL output stream error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                config,
                create_f32_callback(mixer, channels),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_output_stream(
                config,
                create_converting_callback::<i16>(mixer, channels),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I32 => device.build_output_stream(
                config,
                create_converting_callback::<i32>(mixer, channels),
                err_fn,
                None,
            )?,
            other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
        };

        Ok(stream)
    }
}

impl AudioDevice for Device {
    fn now(&self) -> f64 {
        self.mixer.now()
    }

    fn submit(&self, command: PlaybackCommand) -> Result<VoiceHandle, DeviceError> {
        let span = span!(Level::DEBUG, "submit (cpal)");
        let _enter = span.enter();

        self.mixer.submit(command)
    }

    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }
}
