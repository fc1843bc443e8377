//! Flat `KEY:value` cache file.
//!
//! Layout per city:
//!
//! ```text
//! CITY:<name>
//! TEMP:<f64>
//! HUM:<u8>
//! WIND:<f64>
//! DESC:<text>
//! TIME:<unix seconds>
//! FCCOUNT:<n>
//! FC_DATE:<unix seconds>    \
//! FC_TEMP:<f64>              |
//! FC_MIN:<f64>               |  repeated n times,
//! FC_MAX:<f64>               |  always in this order
//! FC_HUM:<u8>                |
//! FC_WIND:<f64>              |
//! FC_DESC:<text>            /
//! END_CITY
//! ```
//!
//! Loading is tolerant: a forecast entry cut short is dropped along with the
//! rest of that city's forecast, and a city block without `END_CITY` is
//! discarded. Everything complete before the damage is kept.
//!
//! Dates are written as unix seconds. Older files wrote `FC_DATE` as
//! `dd/mm/yyyy`; those read back as midnight UTC of that day.

use std::fs;
use std::iter::Peekable;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::cache::CacheEntry;
use crate::types::{Conditions, CurrentWeather, ForecastEntry, PersistenceError};

/// Pressure used for fields the format does not carry
const STANDARD_PRESSURE_HPA: f64 = 1013.25;

const END_CITY: &str = "END_CITY";
const FORECAST_KEYS: [&str; 6] = ["FC_TEMP", "FC_MIN", "FC_MAX", "FC_HUM", "FC_WIND", "FC_DESC"];

/// Serialize cache entries. Cities without current weather are skipped.
pub fn render(entries: &[(String, CacheEntry)]) -> String {
    let mut out = String::new();

    for (city, entry) in entries {
        let Some(current) = &entry.current else {
            continue;
        };
        let forecast = entry.forecast.as_deref().unwrap_or_default();

        out.push_str(&format!("CITY:{}\n", city));
        out.push_str(&format!("TEMP:{}\n", current.temperature));
        out.push_str(&format!("HUM:{}\n", current.humidity));
        out.push_str(&format!("WIND:{}\n", current.wind_speed));
        out.push_str(&format!("DESC:{}\n", current.conditions.description));
        out.push_str(&format!("TIME:{}\n", current.updated_at.timestamp()));
        out.push_str(&format!("FCCOUNT:{}\n", forecast.len()));

        for fc in forecast {
            out.push_str(&format!("FC_DATE:{}\n", fc.time.timestamp()));
            out.push_str(&format!("FC_TEMP:{}\n", fc.temperature));
            out.push_str(&format!("FC_MIN:{}\n", fc.temp_min));
            out.push_str(&format!("FC_MAX:{}\n", fc.temp_max));
            out.push_str(&format!("FC_HUM:{}\n", fc.humidity));
            out.push_str(&format!("FC_WIND:{}\n", fc.wind_speed));
            out.push_str(&format!("FC_DESC:{}\n", fc.conditions.description));
        }

        out.push_str(END_CITY);
        out.push('\n');
    }

    out
}

/// Parse cache file contents, keeping every complete city block.
pub fn parse(text: &str) -> Vec<(String, CacheEntry)> {
    let mut cities = Vec::new();
    let mut lines = text.lines().peekable();
    let mut record: Option<Record> = None;

    while let Some(line) = lines.next() {
        if line == END_CITY {
            match record.take().map(Record::finish) {
                Some(Some(parsed)) => cities.push(parsed),
                Some(None) => tracing::warn!("Dropping cached city with missing fields"),
                None => {}
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if key == "CITY" {
            if let Some(previous) = record.take() {
                tracing::warn!("Cached city {} has no END_CITY marker, dropping", previous.city);
            }
            record = Some(Record::new(value));
            continue;
        }

        let Some(rec) = record.as_mut() else {
            continue;
        };

        match key {
            "TEMP" => rec.temperature = value.parse().ok(),
            "HUM" => rec.humidity = parse_humidity(value),
            "WIND" => rec.wind_speed = value.parse().ok(),
            "DESC" => rec.description = Some(value.to_string()),
            "TIME" => rec.updated_at = parse_time(value),
            "FCCOUNT" => rec.expected_forecast = value.parse().ok(),
            "FC_DATE" if !rec.forecast_broken => match read_forecast_entry(value, &mut lines) {
                Some(entry) => rec.forecast.push(entry),
                None => {
                    tracing::warn!("Truncated forecast entry for cached city {}", rec.city);
                    rec.forecast_broken = true;
                }
            },
            _ => {}
        }
    }

    if let Some(unfinished) = record {
        tracing::warn!("Cache file ends inside city {}, dropping it", unfinished.city);
    }

    cities
}

/// Write `entries` to `path`, creating parent directories.
pub fn write_snapshot(path: &Path, entries: &[(String, CacheEntry)]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, render(entries)).map_err(|source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a cache file. A missing file yields no entries.
pub fn read_snapshot(path: &Path) -> Result<Vec<(String, CacheEntry)>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

struct Record {
    city: String,
    temperature: Option<f64>,
    humidity: Option<u8>,
    wind_speed: Option<f64>,
    description: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    expected_forecast: Option<usize>,
    forecast: Vec<ForecastEntry>,
    forecast_broken: bool,
}

impl Record {
    fn new(city: &str) -> Self {
        Self {
            city: city.to_string(),
            temperature: None,
            humidity: None,
            wind_speed: None,
            description: None,
            updated_at: None,
            expected_forecast: None,
            forecast: Vec::new(),
            forecast_broken: false,
        }
    }

    fn finish(self) -> Option<(String, CacheEntry)> {
        let temperature = self.temperature?;
        let description = self.description?;

        if let Some(expected) = self.expected_forecast {
            if expected != self.forecast.len() {
                tracing::warn!(
                    "Cached city {} lists {} forecast entries, loaded {}",
                    self.city,
                    expected,
                    self.forecast.len()
                );
            }
        }

        let current = CurrentWeather {
            city: self.city.clone(),
            country: String::new(),
            temperature,
            feels_like: temperature,
            temp_min: temperature,
            temp_max: temperature,
            pressure: STANDARD_PRESSURE_HPA,
            humidity: self.humidity?,
            wind_speed: self.wind_speed?,
            wind_deg: 0.0,
            conditions: Conditions::from_description(description),
            sunrise: None,
            sunset: None,
            updated_at: self.updated_at?,
        };

        let entry = CacheEntry {
            current: Some(current),
            forecast: Some(self.forecast),
        };
        Some((self.city, entry))
    }
}

/// Read the six lines following `FC_DATE`. Stops without consuming at the
/// first line that is not the expected key.
fn read_forecast_entry<'a, I>(date: &str, lines: &mut Peekable<I>) -> Option<ForecastEntry>
where
    I: Iterator<Item = &'a str>,
{
    let time = parse_time(date)?;
    let mut values: [&str; 6] = [""; 6];

    for (slot, expected) in values.iter_mut().zip(FORECAST_KEYS) {
        let line: &'a str = *lines.peek()?;
        let (key, value) = line.split_once(':')?;
        if key != expected {
            return None;
        }
        *slot = value;
        lines.next();
    }

    let [temp, min, max, hum, wind, desc] = values;
    let temperature: f64 = temp.parse().ok()?;
    Some(ForecastEntry {
        time,
        temperature,
        feels_like: temperature,
        temp_min: min.parse().ok()?,
        temp_max: max.parse().ok()?,
        pressure: STANDARD_PRESSURE_HPA,
        humidity: parse_humidity(hum)?,
        wind_speed: wind.parse().ok()?,
        wind_deg: 0.0,
        conditions: Conditions::from_description(desc),
    })
}

fn parse_humidity(value: &str) -> Option<u8> {
    let h: f64 = value.trim().parse().ok()?;
    Some(h.round().clamp(0.0, 100.0) as u8)
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(secs) = value.parse() {
        return DateTime::from_timestamp(secs, 0);
    }
    let day = NaiveDate::parse_from_str(value, "%d/%m/%Y").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}
