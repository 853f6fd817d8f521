use anyhow::Result;
use indicatif::MultiProgress;
use log::Level;

use super::command::{Cli, ClipType, WrapArgs};
use super::job::load_job;
use super::progress::create_progress_bar;
use crate::clip::FileClipWriter;
use crate::timestamp::time_str;
use essence::process::graph::{AvciHeaderOptions, AvciMode};
use essence::process::wrap::{WrapJob, WrapOptions, WrapOutcome};
use essence::structs::essence_type::DataDef;
use essence::structs::rational::SAMPLING_RATE_48K;

pub fn cmd_wrap(args: &WrapArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let loaded = load_job(&args.input)?;

    let avci_mode = if args.no_avci_head {
        AvciMode::NoFrameHeader
    } else if args.allow_no_avci_head {
        AvciMode::NoOrAllFrameHeader
    } else {
        AvciMode::AllFrameHeader
    };
    let options = WrapOptions {
        frame_rate: loaded.frame_rate,
        track_map: args.track_map.clone().or(loaded.track_map),
        regression_test: args.input.regtest,
        regtest_end: args.regtest_end,
        duration: args.dur.or(loaded.duration),
        rt_factor: args.rt,
        dump_track_map: args.dump_track_map,
        dump_track_map_exit: args.dump_track_map_exit,
        avci: AvciHeaderOptions {
            mode: avci_mode,
            donors: args.avcihead.clone(),
            builtin: args.ps_avcihead,
        },
        // Configure fail level based on strict mode
        fail_level: if cli.strict { Level::Warn } else { Level::Error },
    };
    let duration = options.duration;

    let mut job = WrapJob::new(loaded.inputs, options)?;
    job.resolve()?;

    let edit_rate = match args.clip_type {
        ClipType::Raw => job.frame_rate(),
        ClipType::Wave => job
            .inputs()
            .iter()
            .find(|input| !input.disabled && input.data_def() == Some(DataDef::Sound))
            .map_or(SAMPLING_RATE_48K, |input| input.sound.sampling_rate),
    };
    let mut writer = FileClipWriter::new(&args.output, args.clip_type, edit_rate);

    let pb = multi.map(|m| create_progress_bar(m, duration)).transpose()?;
    let mut update = |total: u64| {
        if let Some(pb) = &pb {
            pb.set_position(total);
        }
    };
    let progress: Option<&mut dyn FnMut(u64)> = if pb.is_some() { Some(&mut update) } else { None };

    let outcome = job.run(&mut writer, progress)?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    match outcome {
        WrapOutcome::TrackMapDumped(dump) => print!("{dump}"),
        WrapOutcome::Completed { duration } => {
            log::info!(
                "Wrapped {duration} edit units ({}) at {edit_rate}",
                time_str(duration, edit_rate)
            );
            for path in writer.track_paths() {
                log::info!("Wrote {}", path.display());
            }
        }
        WrapOutcome::Truncated { duration } => {
            log::warn!(
                "Clip left incomplete after {duration} edit units ({})",
                time_str(duration, edit_rate)
            );
        }
    }

    Ok(())
}
