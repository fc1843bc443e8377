//! Generated weather used when a live fetch fails.
//!
//! The shape matches a live result (a current reading plus a 3-hourly
//! forecast) and values stay inside plausible bounds, so the UI always has
//! something to show for a tracked city.

use chrono::{DurationRound, Utc};
use rand::Rng;

use crate::types::{Conditions, CurrentWeather, Forecast, ForecastEntry};

pub const TEMPERATURE_RANGE: (f64, f64) = (5.0, 35.0);
pub const HUMIDITY_RANGE: (u8, u8) = (30, 90);
pub const WIND_SPEED_RANGE: (f64, f64) = (0.0, 20.0);

pub const DESCRIPTIONS: [&str; 9] = [
    "Clear sky",
    "Few clouds",
    "Scattered clouds",
    "Broken clouds",
    "Shower rain",
    "Rain",
    "Thunderstorm",
    "Snow",
    "Mist",
];

const STEP_HOURS: i64 = 3;
const STEPS_PER_DAY: u32 = 8;

/// Generate fallback weather for `city` covering `days` days.
pub fn generate(city: &str, days: u32) -> (CurrentWeather, Forecast) {
    generate_with(&mut rand::thread_rng(), city, days)
}

/// Like [`generate`] with a caller-supplied RNG.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, city: &str, days: u32) -> (CurrentWeather, Forecast) {
    let now = Utc::now();
    let temperature = sample_temperature(rng);

    let current = CurrentWeather {
        city: city.to_string(),
        country: String::new(),
        temperature,
        feels_like: temperature + rng.gen_range(-2.0..=2.0),
        temp_min: temperature - rng.gen_range(2.0..=5.0),
        temp_max: temperature + rng.gen_range(0.0..=4.0),
        pressure: rng.gen_range(995.0..=1030.0),
        humidity: sample_humidity(rng),
        wind_speed: sample_wind_speed(rng),
        wind_deg: rng.gen_range(0.0..360.0),
        conditions: sample_conditions(rng),
        sunrise: None,
        sunset: None,
        updated_at: now,
    };

    let start = now
        .duration_trunc(chrono::Duration::hours(1))
        .unwrap_or(now);
    let forecast = (1..=days.saturating_mul(STEPS_PER_DAY))
        .map(|step| {
            let temperature = sample_temperature(rng);
            ForecastEntry {
                time: start + chrono::Duration::hours(STEP_HOURS * i64::from(step)),
                temperature,
                feels_like: temperature + rng.gen_range(-2.0..=2.0),
                temp_min: temperature - rng.gen_range(0.0..=3.0),
                temp_max: temperature + rng.gen_range(0.0..=3.0),
                pressure: rng.gen_range(995.0..=1030.0),
                humidity: sample_humidity(rng),
                wind_speed: sample_wind_speed(rng),
                wind_deg: rng.gen_range(0.0..360.0),
                conditions: sample_conditions(rng),
            }
        })
        .collect();

    (current, forecast)
}

fn sample_temperature<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1)
}

fn sample_humidity<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1)
}

fn sample_wind_speed<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(WIND_SPEED_RANGE.0..=WIND_SPEED_RANGE.1)
}

fn sample_conditions<R: Rng + ?Sized>(rng: &mut R) -> Conditions {
    let description = DESCRIPTIONS[rng.gen_range(0..DESCRIPTIONS.len())];
    Conditions::from_description(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_values_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (current, forecast) = generate_with(&mut rng, "Haifa", 1);

            assert!(current.temperature >= TEMPERATURE_RANGE.0 && current.temperature <= TEMPERATURE_RANGE.1);
            assert!(current.humidity >= HUMIDITY_RANGE.0 && current.humidity <= HUMIDITY_RANGE.1);
            assert!(current.wind_speed >= WIND_SPEED_RANGE.0 && current.wind_speed <= WIND_SPEED_RANGE.1);
            assert!(DESCRIPTIONS.contains(&current.conditions.description.as_str()));

            for entry in &forecast {
                assert!(entry.humidity >= HUMIDITY_RANGE.0 && entry.humidity <= HUMIDITY_RANGE.1);
                assert!(entry.wind_speed <= WIND_SPEED_RANGE.1);
                assert!(entry.temp_min <= entry.temperature && entry.temperature <= entry.temp_max);
            }
        }
    }

    #[test]
    fn test_forecast_shape_is_chronological() {
        let (current, forecast) = generate("Tel Aviv", 5);

        assert_eq!(current.city, "Tel Aviv");
        assert_eq!(forecast.len(), 40);
        assert!(forecast.windows(2).all(|w| w[0].time < w[1].time));
        assert!(forecast[0].time > current.updated_at - chrono::Duration::hours(1));
    }

    #[test]
    fn test_zero_days_has_empty_forecast() {
        let (_, forecast) = generate("Jerusalem", 0);
        assert!(forecast.is_empty());
    }
}
