use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use serde_derive::Serialize;

use crate::error::Result;
use crate::routines::schedule::DoseEvent;
use crate::simulator::Series;

#[derive(Serialize)]
struct SeriesRow<'a> {
    time: String,
    concentration: f64,
    unit: &'a str,
}

#[derive(Serialize)]
struct EventRow<'a> {
    time: String,
    model: &'a str,
    amount: f64,
    unit: &'a str,
    origin: String,
    merged: usize,
}

/// Write a concentration series as `time,concentration,unit` rows.
pub fn write_series<W: Write>(series: &Series, writer: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    let unit = series.unit().symbol();
    for (time, concentration) in series.iter() {
        writer.serialize(SeriesRow {
            time: time.to_rfc3339(),
            concentration,
            unit,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_series_file(series: &Series, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    write_series(series, file)
}

/// Write calendar events, one row each.
pub fn write_dose_events<W: Write>(events: &[DoseEvent], writer: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for event in events {
        writer.serialize(EventRow {
            time: event.timestamp.to_rfc3339(),
            model: event.model.as_str(),
            amount: event.amount,
            unit: event.model.dose_unit(),
            origin: format!("{:?}", event.origin).to_lowercase(),
            merged: event.merged,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_dose_events_file(events: &[DoseEvent], path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    write_dose_events(events, file)
}
