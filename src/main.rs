use anyhow::Result;
use nimbus_core::{App, AppError};
use nimbus_weather::{DataStatus, Orchestrator};
use std::time::Duration;

fn main() -> Result<()> {
    nimbus_core::init()?;

    let (config, _) = nimbus_core::Config::load_validated()?;
    let mut app = App::with_config(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, query @ ..] = args.as_slice() {
        match command.as_str() {
            "search" => return search(&app, &query.join(" ")),
            "set-key" => return set_key(&app, &query.join("")),
            _ => anyhow::bail!(
                "Unknown command: {} (expected: search <city> | set-key <key>)",
                command
            ),
        }
    }

    if let Err(e) = app.initialize() {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    tracing::info!("Nimbus started");

    print_dashboard(app.orchestrator());

    let reprint = app
        .config()
        .refresh_interval()
        .unwrap_or(Duration::from_secs(60));
    let orchestrator = app.orchestrator().clone();
    app.block_on(async {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for ctrl-c: {}", e);
                    }
                    break;
                }
                _ = tokio::time::sleep(reprint) => print_dashboard(&orchestrator),
            }
        }
    });

    app.shutdown()?;
    Ok(())
}

fn search(app: &App, query: &str) -> Result<()> {
    match app.orchestrator().search_cities(query) {
        Ok(cities) if cities.is_empty() => println!("No matching cities"),
        Ok(cities) => cities.iter().for_each(|c| println!("{}", c)),
        Err(e) => {
            let err = AppError::from(e);
            eprintln!("{}", err.user_message());
            tracing::debug!("Search failed: {}", err);
        }
    }
    Ok(())
}

fn set_key(app: &App, key: &str) -> Result<()> {
    if let Err(e) = app.set_api_key(key) {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    println!("API key saved to {}", app.config().api_key_path().display());
    Ok(())
}

fn print_dashboard(orchestrator: &Orchestrator) {
    println!();
    match orchestrator.last_success_at() {
        Some(at) => println!("Nimbus - last live update {}", at.format("%H:%M:%S UTC")),
        None => println!("Nimbus - no live update yet"),
    }

    for city in orchestrator.cities() {
        let Some(current) = orchestrator.current(&city) else {
            println!("  {:<16} loading...", city);
            continue;
        };

        let marker = match orchestrator.data_status(&city) {
            DataStatus::Fallback => " (generated)",
            _ => "",
        };
        println!(
            "  {:<16} {:>5.1}°C  {:<18} humidity {:>3}%  wind {:>4.1} m/s{}",
            city,
            current.temperature,
            current.conditions.description,
            current.humidity,
            current.wind_speed,
            marker,
        );

        if let Some(forecast) = orchestrator.forecast(&city) {
            let (min, max) = forecast.iter().take(8).fold((f64::MAX, f64::MIN), |(lo, hi), e| {
                (lo.min(e.temp_min), hi.max(e.temp_max))
            });
            if !forecast.is_empty() {
                println!("  {:<16} next 24h {:.0}..{:.0}°C", "", min, max);
            }
        }
    }
}
