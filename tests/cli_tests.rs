use assert_cmd::Command;
use predicates::str;
use std::fs;
use tempfile::tempdir;

const GENE_A: &str = "ACGTTAGCCATGGTCAGGATCCTAGTTACGCGATAAGCTGGTTCACTGCAATTGCAGGT";
const GENE_B: &str = "TGCCGGAAGTCCTATATCGGACTTAACGGCCTTAATGCACGGTCGGAACAGGTCTTTGA";

fn write_prg_fasta(path: &std::path::Path) {
    fs::write(path, format!(">geneA\n{}\n>geneB\n{}\n", GENE_A, GENE_B)).unwrap();
}

fn write_reads_fasta(path: &std::path::Path) {
    let fragment = &GENE_A[5..45];
    fs::write(path, format!(">r0\n{0}\n>r1\n{0}\n>r2\n{0}\n", fragment)).unwrap();
}

#[test]
fn test_version() {
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_args_exits_1() {
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.assert().failure().code(1).stderr(str::contains("Usage"));
}

#[test]
fn test_map_missing_required_args_exits_1() {
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.arg("map").assert().failure().code(1);
}

#[test]
fn test_index_missing_input_exits_2() {
    let temp_dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.current_dir(temp_dir.path())
        .arg("index")
        .arg("absent.fa")
        .assert()
        .failure()
        .code(2)
        .stderr(str::contains("Error"));
}

#[test]
fn test_index_then_map() {
    let temp_dir = tempdir().unwrap();
    let prg_fasta = temp_dir.path().join("prgs.fa");
    let reads_fasta = temp_dir.path().join("reads.fa");
    write_prg_fasta(&prg_fasta);
    write_reads_fasta(&reads_fasta);

    // Index: per-gene kmer graph GFAs plus the .idx next to the input.
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.current_dir(temp_dir.path())
        .arg("index")
        .arg("prgs.fa")
        .arg("-k")
        .arg("15")
        .arg("-w")
        .arg("1")
        .assert()
        .success();

    let idx = temp_dir.path().join("prgs.fa.w1.k15.idx");
    assert!(idx.exists());
    assert!(fs::metadata(&idx).unwrap().len() > 0);
    for gene in ["geneA", "geneB"] {
        let gfa = temp_dir.path().join(format!("kmer_prgs/{gene}.k15.w1.gfa"));
        let content = fs::read_to_string(&gfa).unwrap();
        assert!(content.starts_with("H\tVN:Z:1.0"));
        assert!(content.contains("RC:i:0"));
    }

    // Map the gene A reads.
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.current_dir(temp_dir.path())
        .arg("map")
        .arg("prgs.fa")
        .arg("reads.fa")
        .arg("sample1")
        .arg("-k")
        .arg("15")
        .arg("-w")
        .arg("1")
        .arg("--cluster-thresh")
        .arg("2")
        .assert()
        .success();

    let pangraph =
        fs::read_to_string(temp_dir.path().join("sample1_pangraph.gfa")).unwrap();
    assert!(pangraph.contains("geneA"));
    assert!(!pangraph.contains("geneB"));

    let consensus =
        fs::read_to_string(temp_dir.path().join("sample1.consensus.fa")).unwrap();
    assert!(consensus.starts_with(">geneA"));
    assert!(temp_dir.path().join("sample1.kmer_covgs.txt").exists());
    assert!(temp_dir.path().join("sample1.kmer_probs.txt").exists());
}

#[test]
fn test_map_rejects_unknown_model_exits_2() {
    let temp_dir = tempdir().unwrap();
    let prg_fasta = temp_dir.path().join("prgs.fa");
    let reads_fasta = temp_dir.path().join("reads.fa");
    write_prg_fasta(&prg_fasta);
    write_reads_fasta(&reads_fasta);

    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.current_dir(temp_dir.path())
        .arg("map")
        .arg("prgs.fa")
        .arg("reads.fa")
        .arg("sample1")
        .arg("--model")
        .arg("gauss")
        .assert()
        .failure()
        .code(2)
        .stderr(str::contains("invalid probability model"));
}
