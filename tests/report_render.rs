use std::path::PathBuf;
use storyboard::frames::{Position, Screenshot};
use storyboard::report::{render_json, render_markdown, Report, ReportFormat, SceneEntry, VideoMeta};
use storyboard::scenes::BoundarySource;

fn shot(scene: u32, position: Position, timestamp: f64) -> Screenshot {
    Screenshot {
        scene_number: scene,
        position,
        timestamp,
        path: PathBuf::from(format!("/srv/out/req/scenes/scene_{scene:03}_{position}.png")),
    }
}

fn sample_report() -> Report {
    Report {
        job_id: "20240102_030405_127_0_0_1_4242".into(),
        video: VideoMeta {
            filename: "clip.mp4".into(),
            size_bytes: 3 * 1024 * 1024,
            duration: 20.04,
            fingerprint: "sha256:abc".into(),
            processing_time_secs: 1.26,
            generated_at: "2024-01-02T03:04:10Z".into(),
        },
        boundary_source: BoundarySource::Detected,
        scenes: vec![
            SceneEntry {
                scene_number: 1,
                start: 0.0,
                end: 7.333,
                screenshots: vec![
                    shot(1, Position::Beginning, 0.5),
                    shot(1, Position::Middle, 3.6665),
                    shot(1, Position::End, 6.833),
                ],
                description: "A dog runs on a beach.".into(),
            },
            SceneEntry {
                scene_number: 2,
                start: 7.333,
                end: 20.04,
                screenshots: vec![shot(2, Position::Middle, 13.6865)],
                description: "Error generating description: request timed out".into(),
            },
        ],
    }
}

#[test]
fn markdown_has_a_section_per_scene() {
    let md = render_markdown(&sample_report(), "http://localhost:13000/");
    assert!(md.starts_with("# Storyboard\n"));
    assert!(md.contains("- Video: clip.mp4"));
    assert!(md.contains("- Size: 3.00 MB"));
    assert!(md.contains("## Scene 1\n- Timeframe: 0.0s - 7.3s"));
    assert!(md.contains("## Scene 2\n- Timeframe: 7.3s - 20.0s"));
    assert!(md.contains(
        "![Scene 1 beginning](http://localhost:13000/output/20240102_030405_127_0_0_1_4242/scenes/scene_001_beginning.png)"
    ));
    assert!(md.contains("- Description: A dog runs on a beach."));
    assert!(md.contains("- Description: Error generating description: request timed out"));
    assert!(!md.contains("scene_002_beginning"));
    assert!(md.find("## Scene 1").unwrap() < md.find("## Scene 2").unwrap());
}

#[test]
fn json_rounds_times_and_links_frames() {
    let v = render_json(&sample_report(), "http://media.test");
    assert_eq!(v["request_id"], "20240102_030405_127_0_0_1_4242");
    assert_eq!(v["scene_count"], 2);
    assert_eq!(v["boundary_source"], "detected");
    assert_eq!(v["video"]["duration"], 20.0);
    assert_eq!(v["video"]["processing_time_secs"], 1.3);

    let first = &v["scenes"][0];
    assert_eq!(first["scene_number"], 1);
    assert_eq!(first["timeframe"]["start"], 0.0);
    assert_eq!(first["timeframe"]["end"], 7.3);
    assert_eq!(first["screenshots"].as_array().unwrap().len(), 3);
    assert_eq!(first["screenshots"][1]["position"], "middle");
    assert_eq!(first["screenshots"][1]["timestamp"], 3.7);
    assert_eq!(
        first["screenshots"][2]["url"],
        "http://media.test/output/20240102_030405_127_0_0_1_4242/scenes/scene_001_end.png"
    );
    assert_eq!(v["scenes"][1]["screenshots"].as_array().unwrap().len(), 1);
}

#[test]
fn format_parses_from_cli_strings() {
    assert_eq!("markdown".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
    assert_eq!("MD".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
    assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
    assert!("pdf".parse::<ReportFormat>().is_err());
    assert_eq!(ReportFormat::default(), ReportFormat::Markdown);
}
