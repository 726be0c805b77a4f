use std::io::{Cursor, Write};
use std::path::Path;

/// Sample rate used by synthesized test fixtures.
pub const TEST_SAMPLE_RATE: u32 = 16_000;

/// Synthesize a mono sine-tone wav as in-memory bytes.
pub fn tone_wav_bytes(freq_hz: f32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
        let len = (seconds * TEST_SAMPLE_RATE as f32) as usize;
        for i in 0..len {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            let sample = (2.0 * std::f32::consts::PI * freq_hz * t).sin() * 0.8;
            writer.write_sample(sample).expect("write wav sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Write a zip archive with the given entry names and bytes.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create zip parent dirs");
    }
    let file = std::fs::File::create(path).expect("create zip file");
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(data).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

/// Write a labeled upload archive: tone wavs under `safe/` and `danger/`.
pub fn write_labeled_upload(path: &Path, safe: usize, danger: usize) {
    let safe_wav = tone_wav_bytes(220.0, 0.4);
    let danger_wav = tone_wav_bytes(3_000.0, 0.4);
    let mut names = Vec::new();
    for i in 0..safe {
        names.push((format!("clips/safe/calm_{i}.wav"), safe_wav.clone()));
    }
    for i in 0..danger {
        names.push((format!("clips/danger/alert_{i}.wav"), danger_wav.clone()));
    }
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect();
    write_zip(path, &entries);
}
