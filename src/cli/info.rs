use anyhow::Result;
use indicatif::MultiProgress;
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs, InfoFormat};
use super::job::load_job;
use essence::process::input::RawInput;
use essence::process::resolve::{ResolveState, resolve_input};
use essence::structs::essence_type::DataDef;
use essence::structs::rational::Rational;

#[derive(Debug, Serialize)]
struct InfoReport {
    frame_rate: String,
    inputs: Vec<InputInfo>,
}

#[derive(Debug, Default, Serialize)]
struct InputInfo {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    essence_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_def: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sampling_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bits_per_sample: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_sample_size: Option<usize>,
    disabled: bool,
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, _multi: Option<&MultiProgress>) -> Result<()> {
    let mut loaded = load_job(&args.input)?;

    let mut state = ResolveState {
        regression_test: args.input.regtest,
        // Configure fail level based on strict mode
        fail_level: if cli.strict { Level::Warn } else { Level::Error },
        ..ResolveState::new(loaded.frame_rate)
    };

    for input in loaded.inputs.iter_mut().filter(|i| !i.disabled) {
        resolve_input(&mut state, input)?;
    }

    let frame_rate = state.frame_rate();
    let report = InfoReport {
        frame_rate: frame_rate.to_string(),
        inputs: loaded
            .inputs
            .iter_mut()
            .map(|input| describe(input, frame_rate, args.input.regtest))
            .collect(),
    };

    match args.format {
        InfoFormat::Plain => print_plain(&report),
        InfoFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
    }

    Ok(())
}

fn describe(input: &mut RawInput, frame_rate: Rational, regression_test: bool) -> InputInfo {
    let mut info = InputInfo {
        name: input.name(),
        kind: input.kind.to_string(),
        essence_type: input.essence_type.map(|t| t.to_string()),
        data_def: input.data_def().map(|d| d.to_string()),
        disabled: input.disabled,
        ..Default::default()
    };
    if input.disabled {
        return info;
    }

    match input.data_def() {
        Some(DataDef::Sound) => {
            info.sampling_rate = Some(input.sound.sampling_rate.to_string());
            info.bits_per_sample = Some(input.sound.bits_per_sample);
            info.channel_count = Some(input.sound.channel_count);
        }
        Some(DataDef::Picture) => {
            info.aspect_ratio = input.picture.aspect_ratio.value().map(|r| r.to_string());
        }
        _ => {}
    }

    match first_sample_size(input, frame_rate, regression_test) {
        Ok(size) => info.first_sample_size = size,
        Err(e) => log::warn!("{}: could not read a sample: {e}", input.name()),
    }
    input.close();
    info
}

fn first_sample_size(
    input: &mut RawInput,
    frame_rate: Rational,
    regression_test: bool,
) -> Result<Option<usize>> {
    input.configure_reader(frame_rate, regression_test)?;
    if input.read_samples(1)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.reader()?.sample_data().len()))
}

fn print_plain(report: &InfoReport) {
    println!("Frame rate: {}", report.frame_rate);
    for (index, input) in report.inputs.iter().enumerate() {
        println!();
        println!("Input {index}: {}", input.name);
        println!("  Kind: {}", input.kind);
        if input.disabled {
            println!("  Disabled");
            continue;
        }
        if let Some(essence_type) = &input.essence_type {
            println!("  Essence type: {essence_type}");
        }
        if let Some(data_def) = &input.data_def {
            println!("  Data kind: {data_def}");
        }
        if let Some(aspect_ratio) = &input.aspect_ratio {
            println!("  Aspect ratio: {aspect_ratio}");
        }
        if let (Some(rate), Some(bits), Some(channels)) =
            (&input.sampling_rate, input.bits_per_sample, input.channel_count)
        {
            println!("  Sound: {rate} Hz, {bits} bit, {channels} channels");
        }
        match input.first_sample_size {
            Some(size) => println!("  First sample: {size} bytes"),
            None => println!("  First sample: none"),
        }
    }
}
