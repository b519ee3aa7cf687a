use assert_cmd::Command;
use panmap::{load_gene_prgs, Index};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

// Two genes long enough for the default k=15
fn create_test_fasta(path: &Path) {
    let fasta_content = ">seq1\nACGTTAGCCATGGTCAGGATCCTAGTTACGCGATAAGCTGGTTCACTGCAATTGCAGGT\n\
                         >seq2\nTGCCGGAAGTCCTATATCGGACTTAACGGCCTTAATGCACGGTCGGAACAGGTCTTTGA\n";
    fs::write(path, fasta_content).unwrap();
}

// Index builder helper
fn build_index(dir: &Path, fasta_name: &str, w: u32, k: u32) {
    let mut cmd = Command::cargo_bin("panmap").unwrap();
    cmd.current_dir(dir)
        .arg("index")
        .arg(fasta_name)
        .arg("-w")
        .arg(w.to_string())
        .arg("-k")
        .arg(k.to_string())
        .assert()
        .success();

    let idx_path = dir.join(format!("{fasta_name}.w{w}.k{k}.idx"));
    assert!(
        idx_path.exists(),
        "Index file wasn't created at {:?}",
        idx_path
    );
    assert!(
        fs::metadata(&idx_path).unwrap().len() > 0,
        "Index file is empty"
    );
}

#[test]
fn test_index_build() {
    let temp_dir = tempdir().unwrap();
    let fasta_path = temp_dir.path().join("prgs.fa");
    create_test_fasta(&fasta_path);

    build_index(temp_dir.path(), "prgs.fa", 1, 15);
}

#[test]
fn test_index_build_with_custom_kmer_window() {
    let temp_dir = tempdir().unwrap();
    let fasta_path = temp_dir.path().join("prgs.fa");
    create_test_fasta(&fasta_path);

    build_index(temp_dir.path(), "prgs.fa", 5, 11);
    assert!(temp_dir.path().join("prgs.fa.w5.k11.idx").exists());
}

#[test]
fn test_cli_index_reloads_and_matches_in_memory_build() {
    let temp_dir = tempdir().unwrap();
    let fasta_path = temp_dir.path().join("prgs.fa");
    create_test_fasta(&fasta_path);

    build_index(temp_dir.path(), "prgs.fa", 1, 15);
    let loaded = Index::load(&fasta_path, 1, 15).unwrap();

    // Rebuild in memory and compare key-by-key.
    let mut prgs = load_gene_prgs(&fasta_path).unwrap();
    let mut rebuilt = Index::new();
    for prg in &mut prgs {
        prg.minimizer_sketch(&mut rebuilt, 1, 15).unwrap();
    }
    assert_eq!(loaded.len(), rebuilt.len());

    for prg in &prgs {
        for minimizer in panmap::minimizer_sketch(&prg.seq, 1, 15).unwrap() {
            let loaded_records = loaded.get(minimizer.hash);
            assert_eq!(loaded_records, rebuilt.get(minimizer.hash));
            assert!(!loaded_records.is_empty());
        }
    }
}

#[test]
fn test_index_load_rejects_other_parameters() {
    let temp_dir = tempdir().unwrap();
    let fasta_path = temp_dir.path().join("prgs.fa");
    create_test_fasta(&fasta_path);

    build_index(temp_dir.path(), "prgs.fa", 1, 15);

    // No file for the mismatched parameters at all.
    assert!(Index::load(&fasta_path, 1, 13).is_err());

    // Same bytes, different claimed parameters.
    fs::rename(
        temp_dir.path().join("prgs.fa.w1.k15.idx"),
        temp_dir.path().join("prgs.fa.w1.k13.idx"),
    )
    .unwrap();
    assert!(Index::load(&fasta_path, 1, 13).is_err());
}
