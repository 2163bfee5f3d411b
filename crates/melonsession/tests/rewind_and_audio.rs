//! Integration tests for rewind history and audio endpoint behaviour driven
//! through the session controller.

mod common;

use anyhow::Result;
use common::{rewind_config, Harness};
use melonconf::{AudioConfig, EmulatorConfig, LatencyClass, MicSource};
use melonsession::audio::{PerformanceMode, SharingMode};
use melonsession::AudioNotice;

#[test]
fn test_capture_every_two_seconds_at_sixty_fps() -> Result<()> {
    let mut h = Harness::running(rewind_config(2, 300))?;

    h.run_frames(500)?;

    assert_eq!(h.rewind_frames(), vec![120, 240, 360, 480]);
    Ok(())
}

#[test]
fn test_window_bounded_by_duration() -> Result<()> {
    let mut h = Harness::running(rewind_config(2, 4))?;

    h.run_frames(500)?;

    assert_eq!(h.rewind_frames(), vec![360, 480]);
    Ok(())
}

#[test]
fn test_thumbnail_matches_texture_at_capture() -> Result<()> {
    let mut h = Harness::running(rewind_config(1, 10))?;
    h.run_frames(60)?;

    let entry = h.controller.rewind().get(0).cloned().expect("one entry");
    assert_eq!(entry.frame(), 60);
    assert_eq!(entry.thumbnail(), h.texture());
    Ok(())
}

#[test]
fn test_restore_discards_newer_entries() -> Result<()> {
    let mut h = Harness::running(rewind_config(1, 60))?;
    h.run_frames(360)?;
    assert_eq!(h.rewind_frames(), vec![60, 120, 180, 240, 300, 360]);

    let frame = h.controller.rewind_to(2)?;

    assert_eq!(frame, 180);
    assert_eq!(h.controller.frame(), 180);
    assert_eq!(h.controller.core().state_value(), 180);
    assert_eq!(h.rewind_frames(), vec![60, 120, 180]);

    // History continues from the restored point.
    h.run_frames(60)?;
    assert_eq!(h.rewind_frames(), vec![60, 120, 180, 240]);
    Ok(())
}

#[test]
fn test_shrinking_window_keeps_newest() -> Result<()> {
    let mut h = Harness::running(rewind_config(1, 10))?;
    h.run_frames(600)?;
    assert_eq!(h.controller.rewind().len(), 10);

    h.controller.update_configuration(rewind_config(1, 4))?;
    assert_eq!(h.rewind_frames(), vec![420, 480, 540, 600]);

    h.controller.update_configuration(rewind_config(1, 20))?;
    assert_eq!(h.controller.rewind().len(), 4);
    Ok(())
}

#[test]
fn test_reset_clears_rewind() -> Result<()> {
    let mut h = Harness::running(rewind_config(1, 10))?;
    h.run_frames(120)?;
    assert_eq!(h.controller.rewind().len(), 2);

    assert!(h.controller.reset());
    assert!(h.controller.rewind().is_empty());
    Ok(())
}

#[test]
fn test_failed_capture_does_not_stop_emulation() -> Result<()> {
    let mut h = Harness::running(rewind_config(1, 10))?;
    h.controller.core_mut().fail_serialize(true);

    h.run_frames(120)?;

    assert!(h.controller.rewind().is_empty());
    assert_eq!(h.controller.frame(), 120);
    Ok(())
}

#[test]
fn test_unchanged_audio_config_does_not_reopen() -> Result<()> {
    let mut h = Harness::running(EmulatorConfig::default())?;
    assert_eq!(h.driver.output_opens(), 1);

    let mut config = EmulatorConfig::default();
    config.rewind.enabled = true;
    h.controller.update_configuration(config)?;

    assert_eq!(h.driver.output_opens(), 1);
    assert_eq!(h.driver.output_closes(), 0);
    Ok(())
}

#[test]
fn test_latency_change_reopens_with_new_class() -> Result<()> {
    let mut h = Harness::running(EmulatorConfig::default())?;

    let config = EmulatorConfig {
        audio: AudioConfig {
            latency: LatencyClass::LowLatency,
            ..Default::default()
        },
        ..Default::default()
    };
    h.controller.update_configuration(config)?;

    assert_eq!(h.driver.output_opens(), 2);
    assert_eq!(h.driver.output_closes(), 1);
    let params = h.driver.output_params().expect("output open");
    assert_eq!(params.performance, PerformanceMode::LowLatency);
    assert_eq!(params.sharing, SharingMode::Exclusive);
    assert!(h.driver.output_running());
    Ok(())
}

#[test]
fn test_driver_fault_recovers_on_frame_thread() -> Result<()> {
    let mut h = Harness::running(EmulatorConfig::default())?;
    assert!(h.driver.inject_output_fault());

    h.run_frames(1)?;

    assert_eq!(h.driver.output_opens(), 2);
    assert!(h.driver.output_running());
    assert!(h.controller.poll_events().is_empty());
    Ok(())
}

#[test]
fn test_failed_recovery_is_reported_and_muted() -> Result<()> {
    let mut h = Harness::running(EmulatorConfig::default())?;
    h.controller.pause()?;
    h.driver.set_fail_output(true);
    h.driver.inject_output_fault();

    let notices = h.controller.poll_events();

    assert!(matches!(notices.as_slice(), [AudioNotice::OutputLost(_)]));
    assert!(!h.controller.audio().has_output());

    h.controller.resume()?;
    h.run_frames(5)?;
    assert_eq!(h.controller.frame(), 5);
    Ok(())
}

#[test]
fn test_output_open_failure_mutes_session() -> Result<()> {
    let mut h = Harness::new()?;
    h.driver.set_fail_output(true);

    h.controller.configure(EmulatorConfig::default())?;

    assert!(!h.controller.audio().has_output());
    let notices = h.controller.poll_events();
    assert!(matches!(notices.as_slice(), [AudioNotice::OutputLost(_)]));
    Ok(())
}

#[test]
fn test_microphone_falls_back_to_noise() -> Result<()> {
    let mut h = Harness::new()?;
    h.driver.set_fail_input(true);

    let config = EmulatorConfig {
        mic_source: MicSource::HostMicrophone,
        ..Default::default()
    };
    h.controller.configure(config)?;
    h.controller
        .load_rom(melonsession::RomRequest::new("a.nds", "a.sav"))?;
    h.controller.start()?;
    h.run_frames(1)?;

    assert_eq!(h.controller.audio().mic_source(), MicSource::SyntheticNoise);
    let fed = &h.controller.core().mic_frames()[0];
    assert_eq!(fed.len(), 735);
    assert!(fed.iter().any(|&s| s != 0));

    let notices = h.controller.poll_events();
    assert!(matches!(
        notices.as_slice(),
        [AudioNotice::MicrophoneFallback(_)]
    ));
    Ok(())
}

#[test]
fn test_host_microphone_feeds_core() -> Result<()> {
    let config = EmulatorConfig {
        mic_source: MicSource::HostMicrophone,
        ..Default::default()
    };
    let mut h = Harness::running(config)?;
    assert!(h.driver.input_running());

    h.driver.push_input(&[100, -100, 50]);
    h.run_frames(1)?;

    let fed = &h.controller.core().mic_frames()[0];
    assert_eq!(&fed[..4], &[100, -100, 50, 0]);
    Ok(())
}

#[test]
fn test_microphone_fault_recovered_while_running() -> Result<()> {
    let config = EmulatorConfig {
        mic_source: MicSource::HostMicrophone,
        ..Default::default()
    };
    let mut h = Harness::running(config)?;
    assert!(h.driver.inject_input_fault());

    h.run_frames(1)?;

    assert_eq!(h.driver.input_opens(), 2);
    assert!(h.driver.input_running());
    assert!(h.controller.poll_events().is_empty());
    Ok(())
}

#[test]
fn test_microphone_fault_falls_back_when_capture_is_gone() -> Result<()> {
    let config = EmulatorConfig {
        mic_source: MicSource::HostMicrophone,
        ..Default::default()
    };
    let mut h = Harness::running(config)?;
    h.driver.set_fail_input(true);
    assert!(h.driver.inject_input_fault());

    h.run_frames(1)?;

    assert_eq!(h.controller.audio().mic_source(), MicSource::SyntheticNoise);
    assert!(h.controller.core().mic_frames()[0].iter().any(|&s| s != 0));
    assert!(matches!(
        h.controller.poll_events().as_slice(),
        [AudioNotice::MicrophoneFallback(_)]
    ));
    Ok(())
}

#[test]
fn test_switching_mic_source_closes_capture() -> Result<()> {
    let config = EmulatorConfig {
        mic_source: MicSource::HostMicrophone,
        ..Default::default()
    };
    let mut h = Harness::running(config)?;

    h.controller.update_configuration(EmulatorConfig {
        mic_source: MicSource::Silence,
        ..Default::default()
    })?;

    assert!(!h.driver.input_open());
    assert_eq!(h.driver.input_closes(), 1);
    Ok(())
}
