//! Integration tests for the `fix_mate_cigar` command line.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use fix_mate_cigar::{
    flags, CompressionLevel, Header, Reader, Record, RecordBuilder, Reference, Writer, BGZF_EOF,
};
use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fix_mate_cigar"))
}

fn header() -> Header {
    Header::new(
        "@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:10000\n@PG\tID:bwa\tPN:bwa\n",
        vec![Reference::new("chr1", 10_000)],
    )
}

fn records() -> Vec<Record> {
    vec![
        RecordBuilder::new()
            .name("orphan/1")
            .flags(flags::PAIRED | flags::MATE_UNMAPPED | flags::FIRST_SEGMENT)
            .ref_id(0)
            .pos(100)
            .mapq(60)
            .cigar("50M")
            .sequence(&[b'A'; 50])
            .qualities(&[35; 50])
            .string_tag(b"MC", "50M")
            .string_tag(b"XA", "chr1,+500,50M,1")
            .build(),
        RecordBuilder::new()
            .name("pair/1")
            .flags(flags::PAIRED | flags::PROPER_PAIR | flags::FIRST_SEGMENT)
            .ref_id(0)
            .pos(200)
            .cigar("50M")
            .mate(0, 400)
            .template_len(250)
            .string_tag(b"MC", "50M")
            .build(),
    ]
}

fn write_bam(path: &Path, header: &Header, records: &[Record]) {
    let mut writer = Writer::from_path(path, header, CompressionLevel::default()).unwrap();
    writer.write_batch(records).unwrap();
    writer.finish().unwrap();
}

fn read_bam(bytes: &[u8]) -> (Header, Vec<Record>) {
    let reader = Reader::new(bytes).unwrap();
    let header = reader.header().clone();
    (header, reader.collect::<Result<_, _>>().unwrap())
}

fn run(args: &[&str]) -> Output {
    bin().args(args).output().expect("Failed to run fix_mate_cigar")
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = run(&[]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
    assert!(stderr.contains("-i"));
}

#[test]
fn test_help_exits_zero() {
    let output = run(&["-h"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("-o"));
}

#[test]
fn test_missing_input() {
    let output = run(&["-o", "out.bam"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Input BAM not specified"), "stderr: {stderr}");
}

#[test]
fn test_missing_output() {
    let output = run(&["-i", "in.bam"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Output BAM not specified"), "stderr: {stderr}");
}

#[test]
fn test_file_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("output.bam");
    write_bam(&input, &header(), &records());

    let result = run(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(result.status.success(), "{result:?}");

    let (out_header, out_records) = read_bam(&fs::read(&output).unwrap());
    assert_eq!(out_header.to_bytes(), header().to_bytes());
    assert_eq!(out_records.len(), 2);

    let expected = records();
    assert_eq!(
        out_records[0].encoded_len(),
        expected[0].encoded_len() - 7
    );
    let ids: Vec<[u8; 2]> = out_records[0].tags().map(|t| t.id).collect();
    assert_eq!(ids, vec![*b"XA"]);
    assert_eq!(out_records[1], expected[1]);
}

#[test]
fn test_repeated_options_last_wins() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("output.bam");
    let unused = temp_dir.path().join("unused.bam");
    write_bam(&input, &header(), &records());

    let result = run(&[
        "-i",
        "/nonexistent/input.bam",
        "-i",
        input.to_str().unwrap(),
        "-o",
        unused.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(result.status.success(), "{result:?}");
    assert!(!unused.exists());

    let (_, out_records) = read_bam(&fs::read(&output).unwrap());
    assert_eq!(out_records.len(), 2);
    assert!(out_records[0].tag(b"MC").is_none());
}

#[test]
fn test_stdin_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_bam(&input, &header(), &records());
    let input_bytes = fs::read(&input).unwrap();

    let mut child = bin()
        .args(["-i", "-", "-o", "-", "-c", "1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn fix_mate_cigar");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&input_bytes)
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{output:?}");
    assert!(output.stdout.ends_with(&BGZF_EOF));

    let (_, out_records) = read_bam(&output.stdout);
    assert!(out_records[0].tag(b"MC").is_none());
    assert!(out_records[1].tag(b"MC").is_some());
}

#[test]
fn test_compression_levels_do_not_change_content() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_bam(&input, &header(), &records());

    let mut decoded = Vec::new();
    for levels in [&["0"][..], &["9"], &["abc"], &["3", "42"]] {
        let output = temp_dir.path().join("output.bam");
        let mut args = vec!["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()];
        for &level in levels {
            args.extend(["-c", level]);
        }
        let result = run(&args);
        assert!(result.status.success(), "levels {levels:?}: {result:?}");
        decoded.push(read_bam(&fs::read(&output).unwrap()));
    }
    assert!(decoded.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_missing_input_file() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("output.bam");

    let result = run(&[
        "-i",
        "/nonexistent/input.bam",
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("/nonexistent/input.bam"), "stderr: {stderr}");
    assert!(!output.exists());
}

#[test]
fn test_truncated_input() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("output.bam");

    // One good record followed by a record cut short, in a single block
    let good = records().remove(0);
    let mut payload = header().to_bytes();
    payload.extend(good.encode_one());
    let partial = records().remove(1).encode_one();
    payload.extend_from_slice(&partial[..partial.len() / 2]);
    let mut bytes = fix_mate_cigar::encode_block(&payload, CompressionLevel::default()).unwrap();
    bytes.extend_from_slice(&BGZF_EOF);
    fs::write(&input, bytes).unwrap();

    let result = run(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Truncated record"), "stderr: {stderr}");

    // The record before the failure was written and the output closed
    let (_, out_records) = read_bam(&fs::read(&output).unwrap());
    assert_eq!(out_records.len(), 1);
    assert!(out_records[0].tag(b"MC").is_none());
}
