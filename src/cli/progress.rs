use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress over edit units. Without a known total a spinner is shown.
pub fn create_progress_bar(multi: &MultiProgress, total: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} edit units ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} edit units\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("wrapping");
    Ok(pb)
}
