use crate::env_config::AppConfig;
use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use masking_core::{DomainKind, Playback, SessionStage, TestKind};
use masking_render::CurveRenderer;
use masking_session::{
    AdvanceOutcome, PersistenceStatus, PreviewOutcome, SessionStateMachine, SettingsField,
};
use masking_signals::{AudioPayload, HttpSignalService, RetryPolicy, RetryingSignalService};
use masking_store::{JsonFileRepository, ResultRepository, export_csv};
use masking_timing::SystemTimer;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

type Service = RetryingSignalService<HttpSignalService, SystemTimer>;

/// One line of subject or operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Name(String),
    Next,
    Volume(f64),
    Domain(Option<DomainKind>),
    Test(Option<TestKind>),
    Set { field: SettingsField, value: String },
    Settings,
    Gain(f64),
    Retry,
    Play(Sound),
    Status,
    Export,
    Curve,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Tone,
    Trial(Playback),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        let number = |what: &str| -> Result<f64> {
            rest.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| anyhow!("`{word}` needs a {what} in dB, got `{rest}`"))
        };

        Ok(match word.to_ascii_lowercase().as_str() {
            "name" if !rest.is_empty() => Self::Name(rest.to_string()),
            "name" => bail!("`name` needs a name"),
            "next" | "n" | "" => Self::Next,
            "vol" | "volume" => Self::Volume(number("volume")?),
            "domain" if rest.eq_ignore_ascii_case("none") => Self::Domain(None),
            "domain" => Self::Domain(Some(rest.parse()?)),
            "test" if rest.eq_ignore_ascii_case("none") => Self::Test(None),
            "test" => Self::Test(Some(rest.parse()?)),
            "set" => {
                let (field, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: set <field> <value>"))?;
                Self::Set {
                    field: field.parse()?,
                    value: value.trim().to_string(),
                }
            }
            "settings" => Self::Settings,
            "gain" | "g" => Self::Gain(number("gain")?),
            "retry" => Self::Retry,
            "play" => Self::Play(match rest.to_ascii_lowercase().as_str() {
                "tone" => Sound::Tone,
                "masker" => Sound::Trial(Playback::Masker),
                "maskee" => Sound::Trial(Playback::Maskee),
                "both" | "combined" | "" => Sound::Trial(Playback::Combined),
                other => bail!("nothing called `{other}` to play"),
            }),
            "status" => Self::Status,
            "export" => Self::Export,
            "curve" => Self::Curve,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command `{other}`, try `help`"),
        })
    }
}

pub struct App {
    session: SessionStateMachine<Service, JsonFileRepository, SystemTimer>,
    renderer: CurveRenderer,
    output_dir: PathBuf,
    should_exit: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let timer = SystemTimer::new();
        let http = HttpSignalService::new(config.api_url.clone()).with_timeout(config.timeout);
        let service = RetryingSignalService::new(http, timer.clone(), RetryPolicy::default());
        let repository = JsonFileRepository::new(config.results_path.clone());
        let session = SessionStateMachine::new(service, repository, timer)
            .with_settings(config.settings.clone())
            .context("configured settings are invalid")?
            .with_order(config.order);

        fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("creating {}", config.output_dir.display()))?;

        info!(
            api = %config.api_url,
            results = %config.results_path.display(),
            order = ?config.order,
            "masking tester ready"
        );

        Ok(Self {
            session,
            renderer: CurveRenderer::default(),
            output_dir: config.output_dir,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        println!("=== MASKING TESTER ===");
        println!("Type `help` for commands, `quit` to leave.\n");
        self.prompt();

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("reading input")?;
            match Command::parse(&line) {
                Ok(command) => {
                    if let Err(err) = self.handle_input(command) {
                        println!("! {err:#}");
                    }
                }
                Err(err) => println!("! {err:#}"),
            }
            if self.should_exit {
                break;
            }
            self.prompt();
        }
        Ok(())
    }

    fn prompt(&self) {
        let hint = match self.session.stage() {
            SessionStage::Identification => "enter `name <your name>`, then `next`".to_string(),
            SessionStage::Calibration => format!(
                "volume {} dB: `vol <db>` until the tone is barely audible, `play tone`, then `next`",
                self.session
                    .calibration()
                    .map_or(-80.0, |c| c.volume_db())
            ),
            SessionStage::Configuration => {
                let (selection, invalid) = self.session.selection().unwrap_or_default();
                let mut hint = format!(
                    "domain: {}{}, test: {}{}",
                    selection.domain().map_or("-", |d| d.as_str()),
                    if invalid.domain { " (required)" } else { "" },
                    selection.test().map_or("-", |t| t.key()),
                    if invalid.test { " (required)" } else { "" },
                );
                if let Some(domain) = selection.domain() {
                    let keys: Vec<&str> = TestKind::available(domain).iter().map(|t| t.key()).collect();
                    hint.push_str(&format!("; tests: {}", keys.join(", ")));
                }
                hint
            }
            SessionStage::TrialLoop => match (self.session.trials(), self.session.trial_progress()) {
                (Some(trials), Some((done, total))) => {
                    let gain = trials.current().map_or(0.0, |t| t.gain_db);
                    format!(
                        "maskee {}/{total}, gain {gain} dB (0..{}): `gain <db>`, `play`, then `next`",
                        done + 1,
                        trials.default_gain()
                    )
                }
                _ => String::new(),
            },
            SessionStage::Completion => "done: `curve`, `export` or `quit`".to_string(),
        };
        print!("[{}] {hint}\n> ", self.session.stage());
        let _ = io::stdout().flush();
    }

    fn handle_input(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Name(name) => self.session.set_subject(&name)?,
            Command::Next => self.advance()?,
            Command::Volume(db) => {
                let outcome = self.session.commit_volume(db)?;
                report_preview("tone", &outcome);
            }
            Command::Domain(Some(domain)) => self.session.select_domain(domain)?,
            Command::Domain(None) => self.session.clear_domain()?,
            Command::Test(Some(test)) => self.session.select_test(test)?,
            Command::Test(None) => self.session.clear_test()?,
            Command::Set { field, value } => {
                self.session.apply_setting(field, &value)?;
                println!("{field} = {}", field.display_value(self.session.settings()));
            }
            Command::Settings => {
                for field in SettingsField::ALL {
                    println!("  {:<16} {}", field.key(), field.display_value(self.session.settings()));
                }
            }
            Command::Gain(db) => {
                let outcome = self.session.commit_gain(db)?;
                report_preview("preview", &outcome);
            }
            Command::Retry => self.retry()?,
            Command::Play(sound) => self.play(sound)?,
            Command::Status => self.status()?,
            Command::Export => self.export()?,
            Command::Curve => self.curve()?,
            Command::Help => print_help(),
            Command::Quit => self.should_exit = true,
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        match self.session.advance()? {
            AdvanceOutcome::Stage(stage) => println!("-> {stage}"),
            AdvanceOutcome::SelectionRejected(flags) => {
                let mut missing = Vec::new();
                if flags.domain {
                    missing.push("domain");
                }
                if flags.test {
                    missing.push("test");
                }
                println!("select a {} first", missing.join(" and a "));
            }
            AdvanceOutcome::NextTrial { finalized, total } => {
                println!("saved response {finalized}/{total}");
            }
            AdvanceOutcome::Completed(status) => {
                println!("-> {}", SessionStage::Completion);
                report_persistence(&status);
            }
        }
        Ok(())
    }

    fn retry(&mut self) -> Result<()> {
        match self.session.stage() {
            SessionStage::Calibration => {
                let volume = self
                    .session
                    .calibration()
                    .map_or(-80.0, |c| c.volume_db());
                let outcome = self.session.commit_volume(volume)?;
                report_preview("tone", &outcome);
            }
            SessionStage::Configuration => self.advance()?,
            SessionStage::TrialLoop => {
                let outcome = self.session.retry_preview()?;
                report_preview("preview", &outcome);
            }
            SessionStage::Completion => report_persistence(&self.session.retry_save()?),
            SessionStage::Identification => bail!("nothing to retry yet"),
        }
        Ok(())
    }

    fn play(&self, sound: Sound) -> Result<()> {
        let (payload, label) = match sound {
            Sound::Tone => (self.session.calibration_tone(), "calibration"),
            Sound::Trial(Playback::Masker) => (self.session.playback(Playback::Masker), "masker"),
            Sound::Trial(Playback::Maskee) => (self.session.playback(Playback::Maskee), "maskee"),
            Sound::Trial(Playback::Combined) => {
                (self.session.playback(Playback::Combined), "combined")
            }
        };
        let payload = payload.ok_or_else(|| anyhow!("no {label} audio available right now"))?;
        let path = self.write_wav(label, payload)?;
        println!("wrote {}", path.display());
        Ok(())
    }

    fn write_wav(&self, label: &str, payload: &AudioPayload) -> Result<PathBuf> {
        let bytes = STANDARD
            .decode(payload.as_base64())
            .with_context(|| format!("{label} audio is not valid base64"))?;
        let path = self.output_dir.join(format!("{label}.wav"));
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    fn status(&self) -> Result<()> {
        println!("subject: {}", self.session.subject());
        println!("stage:   {}", self.session.stage());
        if let Some(config) = self.session.configuration() {
            println!("test:    {} ({})", config.test(), config.domain().title());
        }
        if let Some(grid) = self.session.grid() {
            println!("grid:    {:?} {}", grid.positions(), grid.domain().unit());
        }
        if let Some(record) = self.session.record() {
            println!("responses: {:?}", record.responses);
        }
        if let Some(status) = self.session.persistence() {
            report_persistence(status);
        }
        Ok(())
    }

    fn export(&self) -> Result<()> {
        let records = self
            .session
            .repository()
            .list()
            .context("reading stored results")?;
        let path = self.output_dir.join("test_results.csv");
        let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        export_csv(io::BufWriter::new(file), &records)?;
        info!(rows = records.len(), path = %path.display(), "exported results");
        println!("exported {} results to {}", records.len(), path.display());
        Ok(())
    }

    fn curve(&self) -> Result<()> {
        let record = self
            .session
            .record()
            .ok_or_else(|| anyhow!("the curve is available once all maskees are done"))?;
        let path = self.output_dir.join("masking_curve.png");
        self.renderer.save_png(record, &path)?;
        println!("wrote {}", path.display());
        Ok(())
    }
}

fn report_preview(what: &str, outcome: &PreviewOutcome) {
    match outcome {
        PreviewOutcome::Applied => println!("{what} ready, `play` to listen"),
        PreviewOutcome::Stale => {}
        PreviewOutcome::Failed(err) => println!("{what} failed: {err}; `retry` to try again"),
    }
}

fn report_persistence(status: &PersistenceStatus) {
    match status {
        PersistenceStatus::Saved { id } => println!("result saved as #{id}"),
        PersistenceStatus::Failed { reason } => {
            warn!(%reason, "result kept in memory only");
            println!("could not save the result ({reason}); `retry` to try again, `export`/`curve` still work");
        }
    }
}

fn print_help() {
    println!(
        "\
  name <text>            subject name (identification)
  next                   continue / finalize the current maskee
  vol <db>               calibration volume, -80..0
  domain <time|frequency|none>
  test <key|none>        e.g. pulseMaskedByPulse
  set <field> <value>    change a setting before the trials start
  settings               show all settings
  gain <db>              maskee gain above calibration
  retry                  repeat a failed request
  play [tone|masker|maskee|both]
                         write the sound to a .wav in the output directory
  status                 show session state
  export                 write all stored results to test_results.csv
  curve                  write masking_curve.png
  quit"
    );
}
