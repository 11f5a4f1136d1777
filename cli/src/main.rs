use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::Read,
    str::FromStr,
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Context;
use directories::ProjectDirs;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tankerkoenig::{FuelType, PriceInfo, SortOrder, Station, Tankerkoenig};

const DEFAULT_RADIUS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Fuel {
    All,
    Diesel,
    E5,
    E10,
}

impl From<Fuel> for FuelType {
    fn from(value: Fuel) -> Self {
        match value {
            Fuel::All => FuelType::All,
            Fuel::Diesel => FuelType::Diesel,
            Fuel::E5 => FuelType::E5,
            Fuel::E10 => FuelType::E10,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortCriteria {
    Distance,
    Price,
    Time,
}

impl From<SortCriteria> for SortOrder {
    fn from(value: SortCriteria) -> Self {
        match value {
            SortCriteria::Distance => SortOrder::Distance,
            SortCriteria::Price => SortOrder::Price,
            SortCriteria::Time => SortOrder::Time,
        }
    }
}

#[derive(clap::Parser, Debug)]
struct Args {
    #[arg(short = 'k', long = "api-key", env = "TANKERKOENIG_API_KEY")]
    api_key: Option<String>,
    #[arg(short, long, help = "Request timeout in seconds", global = true)]
    timeout: Option<u64>,
    #[arg(long, help = "Print the results as JSON", global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl FromStr for Location {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((latitude, longitude)) = s.split_once(',') else {
            color_eyre::eyre::bail!("expected a location of the form <latitude>,<longitude>")
        };

        Ok(Self {
            latitude: latitude.trim().parse()?,
            longitude: longitude.trim().parse()?,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the stations around a location
    Near(Near),
    /// Show all the information on a station
    Detail(Detail),
    /// Show the current prices of stations
    Prices(Prices),
}

fn mk_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct DisplayConfig {
    #[serde(default = "mk_true")]
    opening_times: bool,
    #[serde(default)]
    fuels: Vec<Fuel>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            opening_times: true,
            fuels: Default::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct SearchConfig {
    fuel: Option<Fuel>,
    sort: Option<SortCriteria>,
}

#[derive(Serialize, Deserialize, Default)]
struct Config {
    api_key: Option<String>,
    default_location: Option<Location>,
    default_radius: Option<f64>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    display: DisplayConfig,
}

#[derive(clap::Args, Debug)]
struct Near {
    #[arg(help = "Location of the form <latitude>,<longitude>.")]
    location: Option<Location>,
    #[arg(
        short,
        long,
        help = "Maximum distance of a station from the location (in km). Defaults to 5"
    )]
    radius: Option<f64>,
    #[arg(short, long, help = "Fuel to search for. Defaults to all")]
    fuel: Option<Fuel>,
    #[arg(short, long, help = "Criteria to sort with. Defaults to distance")]
    sort: Option<SortCriteria>,
}

#[derive(clap::Args, Debug)]
struct Detail {
    id: String,
}

#[derive(clap::Args, Debug)]
struct Prices {
    #[arg(required = true)]
    ids: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl DisplayConfig {
    fn shows(&self, fuel: Fuel) -> bool {
        self.fuels.is_empty() || self.fuels.contains(&Fuel::All) || self.fuels.contains(&fuel)
    }

    fn print_prices(&self, diesel: Option<f64>, e5: Option<f64>, e10: Option<f64>) {
        for (fuel, name, price) in [
            (Fuel::Diesel, "diesel", diesel),
            (Fuel::E5, "e5", e5),
            (Fuel::E10, "e10", e10),
        ] {
            if let (true, Some(price)) = (self.shows(fuel), price) {
                println!("  - {name}: {price}");
            }
        }
    }
}

fn print_stations(stations: &[Station], config: &Config) {
    for station in stations {
        print!(
            "== {} - {} {}, {} {}",
            station.name, station.street, station.house_number, station.post_code, station.place,
        );
        if let Some(distance) = station.distance {
            print!(" ({distance} km)");
        }
        println!();

        match station.is_open {
            Some(true) => println!("Open"),
            Some(false) => println!("Closed"),
            None => (),
        }

        println!("Prices:");
        if let Some(price) = station.price {
            println!("  - {price}");
        }
        config
            .display
            .print_prices(station.diesel, station.e5, station.e10);

        if config.display.opening_times && !station.opening_times.is_empty() {
            println!("Opening times:");
            for time in &station.opening_times {
                println!("  - {}: {} - {}", time.text, time.start, time.end);
            }
        }
        println!()
    }
}

fn print_prices(prices: &HashMap<String, PriceInfo>, config: &Config) {
    for (id, info) in prices.iter().sorted_by_key(|(id, _)| *id) {
        println!("== {id} ({:?})", info.status);
        config.display.print_prices(info.diesel, info.e5, info.e10);
        println!()
    }
}

impl Near {
    async fn main(
        self,
        client: &Tankerkoenig,
        config: &Config,
        json: bool,
    ) -> color_eyre::Result<()> {
        let Some(location) = self.location.or(config.default_location) else {
            color_eyre::eyre::bail!("No location provided")
        };

        let radius = self
            .radius
            .or(config.default_radius)
            .unwrap_or(DEFAULT_RADIUS);
        let fuel = self.fuel.or(config.search.fuel).unwrap_or(Fuel::All);
        let sort = self
            .sort
            .or(config.search.sort)
            .unwrap_or(SortCriteria::Distance);

        let stations = client
            .nearby_stations(
                (location.latitude, location.longitude),
                radius,
                fuel.into(),
                sort.into(),
            )
            .await
            .wrap_err("could not search for stations")?;

        match json {
            true => print_json(&stations)?,
            false => print_stations(&stations, config),
        }
        Ok(())
    }
}

impl Detail {
    async fn main(
        self,
        client: &Tankerkoenig,
        config: &Config,
        json: bool,
    ) -> color_eyre::Result<()> {
        let station = client
            .station_details(&self.id)
            .await
            .wrap_err_with(|| format!("could not fetch station {}", self.id))?;

        match json {
            true => print_json(&station)?,
            false => print_stations(std::slice::from_ref(&station), config),
        }
        Ok(())
    }
}

impl Prices {
    async fn main(
        self,
        client: &Tankerkoenig,
        config: &Config,
        json: bool,
    ) -> color_eyre::Result<()> {
        let prices = client
            .prices(&self.ids)
            .await
            .wrap_err("could not fetch prices")?;

        match json {
            true => print_json(&prices)?,
            false => print_prices(&prices, config),
        }
        Ok(())
    }
}

fn config_file(project: &ProjectDirs) -> color_eyre::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .read(true)
        .open(project.config_dir().join("config.toml"))
        .wrap_err("could not open config file")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args = Args::parse();

    let project_dir = ProjectDirs::from("de", "tankerkoenig", "tanker");

    let config = match &project_dir {
        None => Config::default(),
        Some(p) => {
            let config_path = p.config_dir();
            std::fs::create_dir_all(config_path).wrap_err("could not create config directory")?;

            let mut config_file = config_file(p)?;

            let mut config = String::new();
            config_file.read_to_string(&mut config)?;

            toml::from_str(&config)?
        }
    };

    let api_key = match args.api_key.or(config.api_key.clone()) {
        None => {
            color_eyre::eyre::bail!("No API key was provided. The key can be provided either through the command line arguments, the TANKERKOENIG_API_KEY variable or the config file.")
        }
        Some(k) => k,
    };

    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .or(config.timeout)
        .unwrap_or(tankerkoenig::DEFAULT_TIMEOUT);

    let mut client = Tankerkoenig::with_options(api_key)
        .timeout(timeout)
        .build();

    let result = match args.command {
        Command::Near(n) => n.main(&client, &config, args.json).await,
        Command::Detail(d) => d.main(&client, &config, args.json).await,
        Command::Prices(p) => p.main(&client, &config, args.json).await,
    };

    client.close();
    result
}
