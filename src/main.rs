use macroquad::audio::{load_sound_from_bytes, play_sound, PlaySoundParams, Sound};
use macroquad::prelude::*;

use std::path::{Path, PathBuf};

mod audio;
mod config;
mod records;
mod session;
mod timing;

use crate::audio::Microphone;
use crate::config::GameConfig;
use crate::records::RecordStore;
use crate::session::{EndReason, Phase, Session, GAUGE_MAX};
use crate::timing::{OneShot, Ticker};

// -------------------------------
// Config
// -------------------------------
const WIDTH: f32 = 1280.0;
const HEIGHT: f32 = 720.0;

const CONFIG_FILE: &str = "scream.json";
const RECORDS_FILE: &str = "records.json";
const EXPORT_FILE: &str = "records_export.csv";

const NAME_MAX: usize = 24;
const PHONE_MAX: usize = 16;

// Reveal panel dimensions
const PANEL_W: f32 = 560.0;
const PANEL_H: f32 = 360.0;

// -------------------------------
// Sounds: tiny procedural WAVs
// -------------------------------
fn sine_blip(freq: f32, dur_s: f32, vol: f32) -> Vec<u8> {
    let sr: u32 = 44_100;
    let total = (dur_s * sr as f32) as usize;
    let mut samples = Vec::<i16>::with_capacity(total);
    for i in 0..total {
        let t = i as f32 / sr as f32;
        // Plain sine with an exponential tail for a clean arcade blip
        let env = (-5.0 * t / dur_s).exp();
        let s = (2.0 * std::f32::consts::PI * freq * t).sin() * vol * env;
        samples.push((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
    }
    pcm16_wav(sr, &samples)
}

fn pcm16_wav(sr: u32, samples: &[i16]) -> Vec<u8> {
    let num_channels = 1u16;
    let bits_per_sample = 16u16;
    let byte_rate = sr * num_channels as u32 * bits_per_sample as u32 / 8;
    let block_align = num_channels * bits_per_sample / 8;
    let data_len = (samples.len() * 2) as u32;

    let mut out = Vec::<u8>::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&num_channels.to_le_bytes());
    out.extend_from_slice(&sr.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

struct SfxSet {
    go: Sound,
    tick: Sound,
    full: Sound,
    over: Sound,
}

async fn load_sfx() -> SfxSet {
    SfxSet {
        go: load_sound_from_bytes(&sine_blip(880.0, 0.20, 0.45)).await.unwrap(),
        tick: load_sound_from_bytes(&sine_blip(1245.0, 0.08, 0.40)).await.unwrap(),
        full: load_sound_from_bytes(&sine_blip(1568.0, 0.35, 0.50)).await.unwrap(),
        over: load_sound_from_bytes(&sine_blip(150.0, 0.60, 0.50)).await.unwrap(),
    }
}

fn play_sfx(cfg: &GameConfig, sound: &Sound, volume: f32) {
    if cfg.audio_enabled {
        play_sound(
            sound,
            PlaySoundParams {
                looped: false,
                volume: volume * cfg.master_volume,
            },
        );
    }
}

// -------------------------------
// Registration form
// -------------------------------
#[derive(Clone, Copy, PartialEq, Eq)]
enum FormFocus {
    Name,
    Phone,
}

struct RegisterForm {
    name: String,
    phone: String,
    focus: FormFocus,
    error: Option<&'static str>,
}

impl RegisterForm {
    fn new() -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            focus: FormFocus::Name,
            error: None,
        }
    }
}

enum RegisterAction {
    Submit,
    Back,
}

fn update_register(form: &mut RegisterForm) -> Option<RegisterAction> {
    while let Some(c) = get_char_pressed() {
        if c.is_control() {
            continue;
        }
        match form.focus {
            FormFocus::Name => {
                if form.name.chars().count() < NAME_MAX {
                    form.name.push(c);
                }
            }
            FormFocus::Phone => {
                if c.is_ascii_digit() && form.phone.len() < PHONE_MAX {
                    form.phone.push(c);
                }
            }
        }
        form.error = None;
    }
    if is_key_pressed(KeyCode::Backspace) {
        match form.focus {
            FormFocus::Name => {
                form.name.pop();
            }
            FormFocus::Phone => {
                form.phone.pop();
            }
        }
    }
    if is_key_pressed(KeyCode::Tab)
        || is_key_pressed(KeyCode::Up)
        || is_key_pressed(KeyCode::Down)
    {
        form.focus = match form.focus {
            FormFocus::Name => FormFocus::Phone,
            FormFocus::Phone => FormFocus::Name,
        };
    }
    if is_key_pressed(KeyCode::Enter) {
        if form.name.trim().is_empty() {
            form.error = Some("name is required");
            form.focus = FormFocus::Name;
        } else if form.phone.trim().is_empty() {
            form.error = Some("phone is required");
            form.focus = FormFocus::Phone;
        } else {
            return Some(RegisterAction::Submit);
        }
    }
    if is_key_pressed(KeyCode::Escape) {
        return Some(RegisterAction::Back);
    }
    None
}

// -------------------------------
// Scenes
// -------------------------------
enum Scene {
    Start,
    Register,
    Scream,
    Score { score: u32, saved: bool },
    Records { exported: Option<PathBuf> },
}

enum ScreamOutcome {
    Finished(u32),
    Quit,
}

// -------------------------------
// Main Loop
// -------------------------------
#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cfg = GameConfig::load_or_default(CONFIG_FILE);
    let mut store = RecordStore::load(RECORDS_FILE);
    let sfx = load_sfx().await;

    let mut form = RegisterForm::new();
    let mut fullscreen = false;
    let mut scene = Scene::Start;

    loop {
        match scene {
            Scene::Start => {
                draw_start(&cfg);
                if is_key_pressed(KeyCode::Enter) {
                    form = RegisterForm::new();
                    scene = Scene::Register;
                } else if is_key_pressed(KeyCode::D) {
                    scene = Scene::Records { exported: None };
                }
                if is_key_pressed(KeyCode::F11) {
                    fullscreen = !fullscreen;
                    set_fullscreen(fullscreen);
                }
            }
            Scene::Register => {
                draw_register(&form);
                match update_register(&mut form) {
                    Some(RegisterAction::Submit) => scene = Scene::Scream,
                    Some(RegisterAction::Back) => scene = Scene::Start,
                    None => {}
                }
            }
            Scene::Scream => {
                match run_scream(&cfg, &sfx).await {
                    ScreamOutcome::Finished(score) => {
                        let saved = match store.add(&form.name, &form.phone, score) {
                            Ok(()) => true,
                            Err(err) => {
                                log::error!("could not save record: {err:#}");
                                false
                            }
                        };
                        scene = Scene::Score { score, saved };
                    }
                    ScreamOutcome::Quit => scene = Scene::Start,
                }
            }
            Scene::Score { score, saved } => {
                draw_score(score, saved);
                if is_key_pressed(KeyCode::Enter) || is_key_pressed(KeyCode::Escape) {
                    scene = Scene::Start;
                }
            }
            Scene::Records { ref mut exported } => {
                draw_records(&store, exported.as_deref());
                if is_key_pressed(KeyCode::E) {
                    match store.export_csv(EXPORT_FILE) {
                        Ok(path) => {
                            log::info!("exported records to {}", path.display());
                            *exported = Some(path);
                        }
                        Err(err) => log::error!("export failed: {err:#}"),
                    }
                }
                if is_key_pressed(KeyCode::Escape) {
                    scene = Scene::Start;
                }
            }
        }

        next_frame().await;
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Scream Reveal".to_string(),
        window_width: WIDTH as i32,
        window_height: HEIGHT as i32,
        high_dpi: true,
        fullscreen: false,
        ..Default::default()
    }
}

// -------------------------------
// One round of the game
// -------------------------------
async fn run_scream(cfg: &GameConfig, sfx: &SfxSet) -> ScreamOutcome {
    let mut session = Session::new(cfg.clone());
    session.start_acquiring();

    let mut mic = match Microphone::acquire() {
        Ok(mic) => {
            session.audio_ready();
            Some(mic)
        }
        Err(err) => {
            log::warn!("microphone unavailable: {err:#}");
            None
        }
    };

    // Both tickers are created together when the round leaves AudioPending,
    // and only once per session instance.
    let mut ticks: Option<(Ticker, Ticker)> = None;
    let mut end_delay: Option<OneShot> = None;

    loop {
        let dt = get_frame_time();

        // Operator backs out of the round: cancel every pending callback,
        // hand the microphone back, navigate nowhere.
        if is_key_pressed(KeyCode::Escape) {
            if let Some((gauge_ticks, timer_ticks)) = ticks.as_mut() {
                gauge_ticks.cancel();
                timer_ticks.cancel();
            }
            if let Some(delay) = end_delay.as_mut() {
                delay.cancel();
            }
            if let Some(m) = mic.as_mut() {
                m.release();
            }
            log::info!("round abandoned");
            return ScreamOutcome::Quit;
        }

        // Manual retry while the mic is missing: reacquire and restart the
        // round from scratch.
        let can_retry = session.phase() == Phase::AudioPending
            || (session.is_degraded() && session.phase() == Phase::Running);
        if can_retry && is_key_pressed(KeyCode::R) {
            match Microphone::acquire() {
                Ok(m) => {
                    mic = Some(m);
                    session = Session::new(cfg.clone());
                    session.start_acquiring();
                    session.audio_ready();
                    ticks = None;
                    end_delay = None;
                }
                Err(err) => log::warn!("microphone retry failed: {err:#}"),
            }
        } else if session.phase() == Phase::AudioPending && is_key_pressed(KeyCode::Space) {
            session.run_degraded();
        }

        if session.phase() == Phase::Running && ticks.is_none() {
            if let Some(m) = &mic {
                m.resume();
            }
            ticks = Some((Ticker::new(cfg.gauge_tick_secs()), Ticker::new(1.0)));
            play_sfx(cfg, &sfx.go, 0.8);
            log::info!(
                "round started ({})",
                if session.is_degraded() { "no mic" } else { "mic live" }
            );
        }

        let level = mic.as_ref().map(|m| m.level()).unwrap_or(0.0);
        session.observe_level(level);

        if let Some((gauge_ticks, timer_ticks)) = ticks.as_mut() {
            let mut over = None;
            for _ in 0..gauge_ticks.advance(dt) {
                if let Some(reason) = session.gauge_tick() {
                    over = Some(reason);
                }
            }
            for _ in 0..timer_ticks.advance(dt) {
                if let Some(reason) = session.timer_tick() {
                    over = Some(reason);
                } else if session.phase() == Phase::Running && session.remaining() <= 3 {
                    play_sfx(cfg, &sfx.tick, 0.6);
                }
            }
            if let Some(reason) = over {
                // The session already latched; stop both tickers in the
                // same frame so nothing fires after the transition.
                gauge_ticks.cancel();
                timer_ticks.cancel();
                end_delay = Some(OneShot::after(cfg.end_delay_secs()));
                match reason {
                    EndReason::GaugeFull => play_sfx(cfg, &sfx.full, 0.9),
                    EndReason::Timeout => play_sfx(cfg, &sfx.over, 0.9),
                }
                log::info!(
                    "round over ({reason:?}), score {}",
                    session.final_score().unwrap_or(0)
                );
            }
        }

        // Let the result linger on screen, then hand the score off once.
        if let Some(delay) = end_delay.as_mut() {
            if delay.advance(dt) {
                if let Some(m) = mic.as_mut() {
                    m.release();
                }
                return ScreamOutcome::Finished(session.final_score().unwrap_or(0));
            }
        }

        draw_scream(cfg, &session, level, mic.is_some());
        next_frame().await;
    }
}

// -------------------------------
// Utils
// -------------------------------
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn color_lerp(a: Color, b: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    Color::new(
        lerp(a.r, b.r, t),
        lerp(a.g, b.g, t),
        lerp(a.b, b.b, t),
        lerp(a.a, b.a, t),
    )
}

fn draw_centered(text: &str, y: f32, size: u16, color: Color) {
    let d = measure_text(text, None, size, 1.0);
    draw_text(text, (screen_width() - d.width) * 0.5, y, size as f32, color);
}

// -------------------------------
// Rendering
// -------------------------------
fn draw_start(cfg: &GameConfig) {
    clear_background(BLACK);
    draw_centered("SCREAM REVEAL", 150.0, 72, WHITE);
    draw_centered("Scream to uncover the festival logo.", 200.0, 28, GRAY);

    let lines = [
        "Scream into the microphone to fill the reveal gauge".to_string(),
        "Stay loud - the gauge drains while you are quiet".to_string(),
        format!("Reach 100% before the {}s clock runs out", cfg.round_seconds),
    ];
    let mut y = 300.0;
    for line in &lines {
        draw_centered(line, y, 24, LIGHTGRAY);
        y += 30.0;
    }

    let blink = (get_time() * 2.0) as i32 % 2 == 0;
    if blink {
        draw_centered(
            "Press Enter to start",
            480.0,
            32,
            Color::new(0.8, 0.9, 1.0, 1.0),
        );
    }
    draw_centered(
        "D: records  |  F11: fullscreen",
        screen_height() - 40.0,
        20,
        DARKGRAY,
    );
}

fn draw_register(form: &RegisterForm) {
    clear_background(BLACK);
    draw_centered("REGISTER", 130.0, 56, WHITE);

    let sw = screen_width();
    let box_w = 480.0;
    let box_h = 54.0;
    let x = (sw - box_w) * 0.5;
    let caret = (get_time() * 2.5) as i32 % 2 == 0;

    let fields = [
        ("Name", &form.name, FormFocus::Name, 240.0),
        ("Phone", &form.phone, FormFocus::Phone, 350.0),
    ];
    for (label, value, focus, y) in fields {
        let focused = form.focus == focus;
        draw_text(label, x, y - 12.0, 22.0, GRAY);
        draw_rectangle(x, y, box_w, box_h, Color::new(0.10, 0.10, 0.13, 1.0));
        let border = if focused { SKYBLUE } else { DARKGRAY };
        draw_rectangle_lines(x - 2.0, y - 2.0, box_w + 4.0, box_h + 4.0, 2.0, border);
        let shown = if focused && caret {
            format!("{value}_")
        } else {
            value.to_string()
        };
        draw_text(&shown, x + 14.0, y + 36.0, 30.0, WHITE);
    }

    if let Some(error) = form.error {
        draw_centered(error, 460.0, 26, RED);
    }

    draw_centered(
        "Tab: switch field  |  Enter: submit  |  Esc: back",
        screen_height() - 40.0,
        20,
        DARKGRAY,
    );
}

fn draw_scream(cfg: &GameConfig, session: &Session, level: f32, mic_live: bool) {
    let sw = screen_width();
    let sh = screen_height();
    clear_background(Color::new(0.06, 0.04, 0.09, 1.0));

    // Countdown readout
    let secs = format!("{}", session.remaining());
    let timer_color = if session.remaining() <= 3 {
        let pulse = ((get_time() * 6.0).sin() * 0.5 + 0.5) as f32;
        color_lerp(RED, Color::new(1.0, 0.7, 0.7, 1.0), pulse)
    } else {
        WHITE
    };
    draw_centered(&secs, 110.0, 96, timer_color);

    // Reveal panel: the logo sits underneath and is uncovered bottom-up
    let px = (sw - PANEL_W) * 0.5;
    let py = 150.0;
    draw_rectangle(px, py, PANEL_W, PANEL_H, Color::new(0.10, 0.08, 0.14, 1.0));
    draw_logo(px, py);
    let pct = (session.gauge() / GAUGE_MAX).clamp(0.0, 1.0);
    let cover_h = PANEL_H * (1.0 - pct);
    if cover_h > 0.0 {
        draw_rectangle(px, py, PANEL_W, cover_h, Color::new(0.08, 0.06, 0.11, 1.0));
    }
    draw_rectangle_lines(px - 3.0, py - 3.0, PANEL_W + 6.0, PANEL_H + 6.0, 3.0, GRAY);
    draw_centered(
        &format!("{:.0}% revealed", session.gauge()),
        py + PANEL_H + 36.0,
        30,
        LIGHTGRAY,
    );

    // Ripples while the mic is hot
    if session.phase() == Phase::Running && session.is_screaming() {
        let cx = px + PANEL_W * 0.5;
        let cy = py + PANEL_H * 0.5;
        let t = get_time() as f32;
        for i in 0..3 {
            let k = (t * 1.2 + i as f32 * 0.33).fract();
            let radius = lerp(40.0, 220.0, k);
            let alpha = (1.0 - k) * 0.5;
            draw_circle_lines(cx, cy, radius, 2.0, Color::new(1.0, 1.0, 1.0, alpha));
        }
    }

    // Loudness meter with the scream threshold marked on it
    let mx = px;
    let my = py + PANEL_H + 60.0;
    let mw = PANEL_W;
    let mh = 16.0;
    draw_rectangle_lines(mx - 2.0, my - 2.0, mw + 4.0, mh + 4.0, 2.0, GRAY);
    let fill = color_lerp(GREEN, RED, level);
    draw_rectangle(mx, my, mw * level, mh, fill);
    let tx = mx + mw * cfg.scream_threshold;
    draw_line(tx, my - 6.0, tx, my + mh + 6.0, 2.0, YELLOW);
    if session.phase() == Phase::Running && session.is_screaming() {
        let flash = ((get_time() * 6.0).sin().abs()) as f32;
        draw_centered(
            "SCREAMING!",
            my + 48.0,
            30,
            Color::new(1.0, 0.3, 0.3, 0.5 + 0.5 * flash),
        );
    }

    // Phase overlays
    match session.phase() {
        Phase::AudioPending => {
            if !mic_live {
                draw_centered("MICROPHONE UNAVAILABLE", sh * 0.5 - 20.0, 44, RED);
                draw_centered(
                    "R: retry  |  Space: play without mic  |  Esc: back",
                    sh * 0.5 + 24.0,
                    26,
                    LIGHTGRAY,
                );
            }
        }
        Phase::Running if session.is_degraded() => {
            draw_centered(
                "no microphone - the gauge can only drain (R: retry)",
                my + 48.0,
                22,
                Color::new(1.0, 0.6, 0.3, 1.0),
            );
        }
        Phase::Ended => {
            let headline = match session.end_reason() {
                Some(EndReason::GaugeFull) => "FULLY REVEALED!",
                _ => "TIME'S UP!",
            };
            draw_centered(headline, sh * 0.5 - 10.0, 64, YELLOW);
            draw_centered("locking in your score...", sh * 0.5 + 40.0, 26, LIGHTGRAY);
        }
        _ => {}
    }

    draw_text("Esc: back", 16.0, 28.0, 20.0, DARKGRAY);
}

fn draw_logo(px: f32, py: f32) {
    let cx = px + PANEL_W * 0.5;
    let cy = py + PANEL_H * 0.5;
    for (radius, color) in [(150.0, ORANGE), (120.0, RED), (90.0, YELLOW)] {
        draw_circle_lines(cx, cy, radius, 6.0, color);
    }
    let title = "SCREAM FEST";
    let td = measure_text(title, None, 64, 1.0);
    draw_text(title, cx - td.width * 0.5, cy + 10.0, 64.0, GOLD);
    let tagline = "LOUDER THAN EVER";
    let gd = measure_text(tagline, None, 24, 1.0);
    draw_text(tagline, cx - gd.width * 0.5, cy + 48.0, 24.0, WHITE);
}

fn draw_score(score: u32, saved: bool) {
    clear_background(Color::new(0.05, 0.05, 0.06, 1.0));
    draw_centered("YOUR SCREAM", 140.0, 48, WHITE);
    draw_centered(&format!("{score}"), 400.0, 220, GOLD);

    let verdict = if score == 100 {
        "EXCELLENT!"
    } else if score >= 80 {
        "GREAT! JUST A LITTLE MORE"
    } else {
        "NEED MORE PRACTICE"
    };
    draw_centered(verdict, 480.0, 40, Color::new(0.9, 0.5, 0.5, 1.0));

    if saved {
        draw_centered("record saved", 540.0, 22, GREEN);
    } else {
        draw_centered("record not saved - check the log", 540.0, 22, RED);
    }

    draw_centered("Enter: play again", screen_height() - 60.0, 28, GRAY);
}

fn draw_records(store: &RecordStore, exported: Option<&Path>) {
    clear_background(BLACK);
    draw_centered("RECORDS", 100.0, 48, WHITE);

    let x = 200.0;
    let mut y = 170.0;
    draw_text("name", x, y, 24.0, GRAY);
    draw_text("phone", x + 320.0, y, 24.0, GRAY);
    draw_text("score", x + 560.0, y, 24.0, GRAY);
    draw_text("saved at", x + 680.0, y, 24.0, GRAY);
    y += 12.0;
    draw_line(x, y, x + 880.0, y, 1.0, DARKGRAY);
    y += 28.0;

    // Latest first, as many rows as fit
    for r in store.records().iter().rev().take(14) {
        draw_text(&r.name, x, y, 24.0, WHITE);
        draw_text(&r.phone, x + 320.0, y, 24.0, WHITE);
        draw_text(&format!("{}", r.score), x + 560.0, y, 24.0, GOLD);
        draw_text(&format!("{}", r.timestamp), x + 680.0, y, 24.0, LIGHTGRAY);
        y += 30.0;
    }
    if store.records().is_empty() {
        draw_centered("no records yet", 260.0, 26, DARKGRAY);
    }

    if let Some(path) = exported {
        draw_centered(
            &format!("exported to {}", path.display()),
            screen_height() - 90.0,
            22,
            GREEN,
        );
    }
    draw_centered(
        &format!(
            "{} total  |  E: export CSV  |  Esc: back",
            store.records().len()
        ),
        screen_height() - 40.0,
        22,
        GRAY,
    );
}
