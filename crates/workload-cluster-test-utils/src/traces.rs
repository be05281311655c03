//! Writing trace directories in the format `load_workload` reads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use workload_cluster_core::loader::DATETIME_FORMAT;
use workload_cluster_core::series::TimeSeries;

use crate::series::base_timestamp;

/// Write one trace file for `template` at `path`.
pub fn write_trace_file(path: &Path, template: &str, series: &TimeSeries) -> io::Result<()> {
    let mut content = String::from("first_seen,template\n");
    content.push_str(&format!(
        "{},\"{}\"\n",
        base_timestamp().format(DATETIME_FORMAT),
        template.replace('"', "\"\"")
    ));
    for (ts, count) in series.iter() {
        content.push_str(&format!("{},{}\n", ts.format(DATETIME_FORMAT), count));
    }
    fs::write(path, content)
}

/// Write `templates` under `dir` as `template-<n>.csv`, creating `dir`.
pub fn write_trace_dir(dir: &Path, templates: &[(&str, TimeSeries)]) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    templates
        .iter()
        .enumerate()
        .map(|(i, (text, series))| {
            let path = dir.join(format!("template-{:04}.csv", i));
            write_trace_file(&path, text, series)?;
            Ok(path)
        })
        .collect()
}
