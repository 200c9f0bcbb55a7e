//! DAF - delayed auditory feedback from the command line.
//!
//! Routes the default capture device through the DAF engine to the default
//! playback device and takes live parameter changes on stdin:
//!
//! ```text
//! gain <db>     input gain, -24 to +24 dB
//! delay <ms>    delay time, 0 to 2000 ms
//! mix <0-1>     dry/wet blend
//! pitch <st>    pitch shift, -12 to +12 semitones
//! on / off      enable or mute processing
//! status        print current parameter targets and levels
//! quit          save settings and exit
//! ```

mod settings;

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ringbuf::{traits::*, HeapRb};
use tracing::{info, warn};

use daf_audio::{level_color, AudioEngine, EngineConfig, EngineController, MeterRepaintGate};

use settings::Settings;

/// Engine block size; cpal callbacks larger than this are chunked
const MAX_BLOCK: usize = 1024;

/// Terminal meter refresh rate
const METER_FPS: u64 = 30;

/// Commands parsed from stdin
enum Command {
    Gain(f32),
    Delay(f32),
    Mix(f32),
    Pitch(f32),
    Enable(bool),
    Status,
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let saved = Settings::load();

    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no capture device found"))?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no playback device found"))?;

    let input_config = input_device
        .default_input_config()
        .context("querying capture format")?
        .config();
    let output_config = output_device
        .default_output_config()
        .context("querying playback format")?
        .config();

    if input_config.sample_rate != output_config.sample_rate {
        return Err(anyhow!(
            "capture runs at {} Hz but playback at {} Hz; resampling is out of scope",
            input_config.sample_rate.0,
            output_config.sample_rate.0
        ));
    }
    let sample_rate = output_config.sample_rate.0;
    let in_channels = input_config.channels as usize;
    let out_channels = output_config.channels as usize;
    let channels = out_channels.clamp(1, 2);

    info!(sample_rate, in_channels, out_channels, "devices ready");

    let mut engine = AudioEngine::new(EngineConfig {
        channels,
        ..EngineConfig::default()
    });
    let controller = engine.controller();
    engine.prepare(sample_rate as f64, MAX_BLOCK)?;

    if let Some(delay) = saved.delay_time_ms {
        controller.set_delay_time_ms(delay);
    }
    if let Some(pitch) = saved.pitch_semitones {
        controller.set_pitch_semitones(pitch);
    }

    // One second of headroom between the capture and playback callbacks
    let ring = HeapRb::<f32>::new(sample_rate as usize * channels);
    let (mut producer, mut consumer) = ring.split();

    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(in_channels) {
                    // Drop whole frames when the ring is full so the
                    // channel interleaving never skews
                    if producer.vacant_len() < channels {
                        continue;
                    }
                    let left = frame[0];
                    let right = if frame.len() > 1 { frame[1] } else { left };
                    let _ = producer.try_push(left);
                    if channels == 2 {
                        let _ = producer.try_push(right);
                    }
                }
            },
            |err| warn!(%err, "capture stream error"),
            None,
        )
        .context("opening capture stream")?;

    // Planar scratch reused by every callback; the engine works in place
    let mut left = vec![0.0f32; MAX_BLOCK];
    let mut right = vec![0.0f32; MAX_BLOCK];
    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / out_channels;
                let mut done = 0;
                while done < frames {
                    let n = (frames - done).min(MAX_BLOCK);
                    for i in 0..n {
                        left[i] = consumer.try_pop().unwrap_or(0.0);
                        if channels == 2 {
                            right[i] = consumer.try_pop().unwrap_or(0.0);
                        }
                    }

                    if channels == 2 {
                        let mut block = [&mut left[..n], &mut right[..n]];
                        engine.process(&mut block);
                    } else {
                        let mut block = [&mut left[..n]];
                        engine.process(&mut block);
                    }

                    for i in 0..n {
                        let start = (done + i) * out_channels;
                        for (c, sample) in data[start..start + out_channels].iter_mut().enumerate()
                        {
                            *sample = match c {
                                0 => left[i],
                                1 if channels == 2 => right[i],
                                1 => left[i],
                                _ => 0.0,
                            };
                        }
                    }
                    done += n;
                }
            },
            |err| warn!(%err, "playback stream error"),
            None,
        )
        .context("opening playback stream")?;

    input_stream.play().context("starting capture")?;
    output_stream.play().context("starting playback")?;
    controller.set_processing_enabled(true);
    info!("processing enabled - type 'off' to mute, 'quit' to exit");

    let (tx, rx) = bounded(64);
    spawn_stdin_thread(tx);
    run_control_loop(&controller, rx);

    controller.set_processing_enabled(false);
    let settings = Settings {
        delay_time_ms: Some(controller.delay_time_ms()),
        pitch_semitones: Some(controller.pitch_semitones()),
    };
    if let Err(err) = settings.save() {
        warn!(%err, "failed to save settings");
    }
    println!();
    Ok(())
}

/// Reads stdin lines and forwards parsed commands to the control loop.
fn spawn_stdin_thread(tx: Sender<Command>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    let quit = matches!(command, Command::Quit);
                    if tx.send(command).is_err() || quit {
                        return;
                    }
                }
                None => {
                    println!(
                        "commands: gain <db> | delay <ms> | mix <0-1> | pitch <st> | on | off | status | quit"
                    );
                }
            }
        }
        // EOF behaves like quit
        let _ = tx.send(Command::Quit);
    });
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.trim().split_whitespace();
    let word = parts.next()?;
    let value = parts.next().and_then(|arg| arg.parse::<f32>().ok());
    match word {
        "gain" => value.map(Command::Gain),
        "delay" => value.map(Command::Delay),
        "mix" => value.map(Command::Mix),
        "pitch" => value.map(Command::Pitch),
        "on" => Some(Command::Enable(true)),
        "off" => Some(Command::Enable(false)),
        "status" => Some(Command::Status),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Applies commands and repaints the level meter until quit.
fn run_control_loop(controller: &EngineController, rx: Receiver<Command>) {
    let mut gates = [MeterRepaintGate::new(0.01), MeterRepaintGate::new(0.01)];
    let tick = Duration::from_millis(1000 / METER_FPS);

    loop {
        match rx.recv_timeout(tick) {
            Ok(Command::Gain(db)) => controller.set_input_gain_db(db),
            Ok(Command::Delay(ms)) => controller.set_delay_time_ms(ms),
            Ok(Command::Mix(mix)) => controller.set_dry_wet_mix(mix),
            Ok(Command::Pitch(semitones)) => controller.set_pitch_semitones(semitones),
            Ok(Command::Enable(enabled)) => {
                controller.set_processing_enabled(enabled);
                info!(enabled, "processing toggled");
            }
            Ok(Command::Status) => print_status(controller),
            Ok(Command::Quit) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let levels = [controller.level(0), controller.level(1)];
        let moved_left = gates[0].should_repaint(levels[0]);
        let moved_right = gates[1].should_repaint(levels[1]);
        if moved_left || moved_right {
            print_meter(levels);
        }
    }
}

fn print_status(controller: &EngineController) {
    println!(
        "\ngain {:+.1} dB | delay {:.0} ms | mix {:.2} | pitch {:+.1} st | {} | L {:.1} dB  R {:.1} dB",
        controller.input_gain_db(),
        controller.delay_time_ms(),
        controller.dry_wet_mix(),
        controller.pitch_semitones(),
        if controller.is_processing_enabled() {
            "on"
        } else {
            "off"
        },
        controller.level_db(0),
        controller.level_db(1),
    );
}

/// One-line meter bar per channel, colored along the green→yellow→red sweep.
fn print_meter(levels: [f32; 2]) {
    let mut line = String::from("\r");
    for (index, &level) in levels.iter().enumerate() {
        let [r, g, _] = level_color(level);
        let code = if r < 0.5 {
            32 // green
        } else if g > 0.5 {
            33 // yellow
        } else {
            31 // red
        };
        let bar = "#".repeat((level.clamp(0.0, 1.0) * 20.0) as usize);
        line.push_str(&format!(
            "{} \x1b[{}m{:<20}\x1b[0m ",
            if index == 0 { "L" } else { "R" },
            code,
            bar,
        ));
    }
    print!("{}", line);
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_values() {
        assert!(matches!(parse_command("delay 150"), Some(Command::Delay(ms)) if ms == 150.0));
        assert!(matches!(parse_command("pitch -3.5"), Some(Command::Pitch(st)) if st == -3.5));
        assert!(matches!(parse_command("on"), Some(Command::Enable(true))));
        assert!(matches!(parse_command("quit"), Some(Command::Quit)));
    }

    #[test]
    fn test_parse_command_rejects_junk() {
        assert!(parse_command("").is_none());
        assert!(parse_command("delay").is_none());
        assert!(parse_command("delay fast").is_none());
        assert!(parse_command("frobnicate 3").is_none());
    }
}
