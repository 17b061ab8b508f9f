use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use dmac_lib::{Dmac, StateArchive};
use crate::config::Config;
use crate::error::{AppError, Result};

/// What the fake device saw during the run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub calls: u32,
    pub data_qwc: u64,
    pub tags: u32,
}

pub struct App {
    dmac: Dmac,
    config: Config,
    stats: Rc<RefCell<Stats>>,
}

impl App {
    pub fn start(config_path: &Path) -> Result<()> {
        let config = Config::load(config_path)?;
        let image = fs::read(&config.image)?;

        info!("Loaded {} bytes from {}", image.len(), config.image.display());

        let mut app = App::new(config, &image)?;
        let ticks = app.run()?;
        let stats = app.stats();

        info!(
            "Channel {} {} after {} ticks: {} receive calls, {} quadwords, {} tags",
            app.config.channel,
            if app.finished() { "finished" } else { "still running" },
            ticks,
            stats.calls,
            stats.data_qwc,
            stats.tags
        );

        app.write_savestate()
    }

    pub fn new(config: Config, image: &[u8]) -> Result<App> {
        let mut dmac = Dmac::new(config.ram_size);

        let base = config.load_base as usize;
        let end = base
            .checked_add(image.len())
            .filter(|&end| end <= config.ram_size)
            .ok_or(AppError::ImageTooBig {
                size: image.len(),
                base: config.load_base,
            })?;

        dmac.ram_mut()[base..end].copy_from_slice(image);

        let stats = Rc::new(RefCell::new(Stats::default()));
        let device_stats = stats.clone();
        let budget = config.qwc_per_call;

        dmac.channel_mut(config.channel)
            .set_receive_handler(Box::new(move |addr, qwc, _, tag| {
                let accepted = if budget == 0 { qwc } else { qwc.min(budget) };
                let mut stats = device_stats.borrow_mut();

                stats.calls += 1;

                if tag {
                    stats.tags += accepted;
                    debug!("Tag at 0x{:08x}", addr);
                } else {
                    stats.data_qwc += u64::from(accepted);
                    debug!("Receive {}/{} QW at 0x{:08x}", accepted, qwc, addr);
                }

                accepted
            }));

        Ok(App {
            dmac,
            config,
            stats,
        })
    }

    /// Kick the channel and tick the controller until it's done or we run out of ticks. Returns
    /// the number of ticks used.
    pub fn run(&mut self) -> Result<u32> {
        let config = &self.config;

        self.dmac.set_d_pcr(config.d_pcr);
        self.dmac.set_d_enable(config.d_enable);

        let channel = self.dmac.channel_mut(config.channel);
        channel.set_madr(config.madr);
        channel.set_qwc(config.qwc);
        channel.set_tadr(config.tadr);

        self.dmac.write_chcr(config.channel, config.chcr)?;

        let mut ticks = 0;

        while !self.finished() {
            if ticks == config.max_ticks {
                warn!("Giving up after {} ticks", ticks);
                break;
            }

            self.dmac.tick()?;
            ticks += 1;
        }

        Ok(ticks)
    }

    pub fn finished(&self) -> bool {
        !self.dmac.channel(self.config.channel).chcr().running()
    }

    pub fn stats(&self) -> Stats {
        *self.stats.borrow()
    }

    #[cfg(test)]
    pub fn dmac(&self) -> &Dmac {
        &self.dmac
    }

    fn write_savestate(&self) -> Result<()> {
        let path = match &self.config.savestate {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut archive = StateArchive::new();
        self.dmac.save_state(&mut archive);

        fs::write(path, archive.to_bytes()?)?;

        info!("Savestate written to '{}'", path.display());

        Ok(())
    }
}
