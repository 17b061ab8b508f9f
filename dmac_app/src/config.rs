use std::path::{Path, PathBuf};
use ini::{Ini, Properties};
use tracing::warn;
use dmac_lib::{CHANNEL_COUNT, RAM_SIZE};
use crate::error::{AppError, Result};

/// Run description, loaded from an INI file:
///
/// ```ini
/// [Memory]
/// image = chain.bin
/// base = 0x0
///
/// [Channel]
/// number = 2
/// chcr = 0x105
/// tadr = 0x1000
///
/// [Receiver]
/// qwc_per_call = 8
///
/// [Run]
/// max_ticks = 1000
/// savestate = dmac.dms
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Raw memory image copied into RAM before the run
    pub image: PathBuf,
    pub load_base: u32,
    pub ram_size: usize,
    /// D_ENABLEW value
    pub d_enable: u32,
    pub d_pcr: u32,
    pub channel: usize,
    pub chcr: u32,
    pub madr: u32,
    pub qwc: u32,
    pub tadr: u32,
    /// Quadwords the fake device accepts per call, 0 for no limit
    pub qwc_per_call: u32,
    pub max_ticks: u32,
    pub savestate: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Config::from_ini(&ini)?;

        // Relative image paths are relative to the config file
        if config.image.is_relative() {
            if let Some(dir) = path.parent() {
                config.image = dir.join(&config.image);
            }
        }

        Ok(config)
    }

    pub fn from_ini(ini: &Ini) -> Result<Config> {
        let memory = section(ini, "Memory")?;
        let channel = section(ini, "Channel")?;

        let image = match memory.get("image") {
            Some(p) => PathBuf::from(p),
            None => return Err(missing("Memory", "image")),
        };

        let ram_size = get_u32(memory, "Memory", "size")?.map_or(RAM_SIZE, |s| s as usize);
        if !ram_size.is_power_of_two() || ram_size < 16 {
            return Err(bad_value("Memory", "size", &ram_size.to_string()));
        }

        let number = match get_u32(channel, "Channel", "number")? {
            Some(n) if (n as usize) < CHANNEL_COUNT => n as usize,
            Some(n) => return Err(bad_value("Channel", "number", &n.to_string())),
            None => return Err(missing("Channel", "number")),
        };

        let chcr = match get_u32(channel, "Channel", "chcr")? {
            Some(v) => v,
            None => return Err(missing("Channel", "chcr")),
        };

        let (d_enable, d_pcr) = match ini.section(Some("Dmac")) {
            Some(dmac) => (
                get_u32(dmac, "Dmac", "enable")?.unwrap_or(0),
                get_u32(dmac, "Dmac", "pcr")?.unwrap_or(0),
            ),
            None => (0, 0),
        };

        let (qwc_per_call, max_ticks, savestate) = {
            let receiver = ini.section(Some("Receiver"));
            let run = ini.section(Some("Run"));

            let qwc_per_call = match receiver {
                Some(r) => get_u32(r, "Receiver", "qwc_per_call")?.unwrap_or(0),
                None => 0,
            };

            let max_ticks = match run {
                Some(r) => get_u32(r, "Run", "max_ticks")?.unwrap_or(DEFAULT_MAX_TICKS),
                None => DEFAULT_MAX_TICKS,
            };

            let savestate = run.and_then(|r| r.get("savestate")).map(PathBuf::from);

            (qwc_per_call, max_ticks, savestate)
        };

        if d_enable != 0 {
            warn!("Starting with D_ENABLE = 0x{:08x}, the channel will be held", d_enable);
        }

        Ok(Config {
            image,
            load_base: get_u32(memory, "Memory", "base")?.unwrap_or(0),
            ram_size,
            d_enable,
            d_pcr,
            channel: number,
            chcr,
            madr: get_u32(channel, "Channel", "madr")?.unwrap_or(0),
            qwc: get_u32(channel, "Channel", "qwc")?.unwrap_or(0),
            tadr: get_u32(channel, "Channel", "tadr")?.unwrap_or(0),
            qwc_per_call,
            max_ticks,
            savestate,
        })
    }
}

const DEFAULT_MAX_TICKS: u32 = 10_000;

fn section<'a>(ini: &'a Ini, name: &str) -> Result<&'a Properties> {
    ini.section(Some(name)).ok_or_else(|| AppError::MissingKey {
        section: name.to_string(),
        key: String::new(),
    })
}

fn missing(section: &str, key: &str) -> AppError {
    AppError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn bad_value(section: &str, key: &str, value: &str) -> AppError {
    AppError::BadValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Optional register-like value, decimal or 0x-prefixed hexadecimal
fn get_u32(props: &Properties, section: &str, key: &str) -> Result<Option<u32>> {
    match props.get(key) {
        Some(text) => parse_u32(text)
            .map(Some)
            .ok_or_else(|| bad_value(section, key, text)),
        None => Ok(None),
    }
}

fn parse_u32(text: &str) -> Option<u32> {
    let text = text.trim().replace('_', "");

    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
