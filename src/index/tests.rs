use super::*;
use tempfile::TempDir;

fn sample_index() -> FlatIndex {
    FlatIndex::build(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 2.0],
        vec![3.0, 3.0],
        vec![-1.0, 0.0],
    ])
    .expect("should build index")
}

#[test]
fn build_assigns_rows_in_order() {
    let index = sample_index();
    assert_eq!(index.len(), 5);
    assert_eq!(index.dimension(), 2);
    assert_eq!(index.row(2), Some([0.0, 2.0].as_slice()));
    assert_eq!(index.row(5), None);
}

#[test]
fn build_rejects_empty_and_ragged_input() {
    assert!(matches!(
        FlatIndex::build(Vec::<Vec<f32>>::new()),
        Err(RagError::EmptyInput(_))
    ));
    assert!(matches!(
        FlatIndex::build(vec![vec![1.0, 2.0], vec![1.0]]),
        Err(RagError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn search_orders_by_squared_distance() {
    let index = sample_index();
    let hits = index.search(&[0.9, 0.1], 3).expect("search succeeds");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].row, 1);
    assert_eq!(hits[1].row, 0);
    assert!((hits[0].distance - 0.02).abs() < 1e-6);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn search_caps_k_at_row_count() {
    let index = sample_index();
    let hits = index.search(&[0.0, 0.0], 50).expect("search succeeds");
    assert_eq!(hits.len(), 5);

    let hits = index.search(&[0.0, 0.0], 0).expect("search succeeds");
    assert!(hits.is_empty());
}

#[test]
fn ties_keep_insertion_order() {
    let index = FlatIndex::build(vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
    ])
    .expect("should build index");

    let hits = index.search(&[0.0, 0.0], 4).expect("search succeeds");
    let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
    assert_eq!(rows, vec![0, 1, 2, 3]);
}

#[test]
fn search_is_deterministic() {
    let index = sample_index();
    let first = index.search(&[0.5, 0.5], 3).expect("search succeeds");
    let second = index.search(&[0.5, 0.5], 3).expect("search succeeds");
    assert_eq!(first, second);
}

#[test]
fn search_rejects_wrong_dimension() {
    let index = sample_index();
    let result = index.search(&[0.0, 0.0, 0.0], 1);
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[test]
fn appending_keeps_existing_rows() {
    let mut index = sample_index();
    let before = index.search(&[3.0, 3.0], 1).expect("search succeeds");

    let row = index.add(&[10.0, 10.0]).expect("should append");
    assert_eq!(row, 5);

    let after = index.search(&[3.0, 3.0], 1).expect("search succeeds");
    assert_eq!(before, after);
    assert_eq!(index.search(&[10.0, 10.0], 1).expect("search succeeds")[0].row, 5);
}

#[test]
fn zero_dimension_is_rejected() {
    assert!(matches!(FlatIndex::new(0), Err(RagError::Config(_))));
}

#[test]
fn normalize_produces_unit_vectors() {
    let mut vector = vec![3.0, 4.0];
    normalize(&mut vector);
    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);

    let mut zero = vec![0.0, 0.0];
    normalize(&mut zero);
    assert_eq!(zero, vec![0.0, 0.0]);
}

const TAG: IndexTag = [7; TAG_LEN];

#[test]
fn bytes_round_trip_through_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("index.bin");
    let index = sample_index();

    index.save(&path, &TAG).expect("should save index");
    let size = std::fs::metadata(&path).expect("file exists").len();
    assert_eq!(size, (HEADER_LEN + 5 * 2 * 4) as u64);

    let (loaded, tag) = FlatIndex::load(&path).expect("should load index");
    assert_eq!(loaded, index);
    assert_eq!(tag, TAG);
}

#[test]
fn load_rejects_bad_signature() {
    let mut bytes = sample_index().to_bytes(&TAG);
    bytes[0] = b'X';
    assert!(matches!(
        FlatIndex::from_bytes(&bytes),
        Err(RagError::DataIntegrity(_))
    ));
}

#[test]
fn load_rejects_truncated_payload() {
    let bytes = sample_index().to_bytes(&TAG);
    let truncated = &bytes[..bytes.len() - 3];
    assert!(matches!(
        FlatIndex::from_bytes(truncated),
        Err(RagError::DataIntegrity(_))
    ));
    assert!(matches!(
        FlatIndex::from_bytes(&bytes[..5]),
        Err(RagError::DataIntegrity(_))
    ));
    // Header cut inside the tag
    assert!(matches!(
        FlatIndex::from_bytes(&bytes[..HEADER_LEN - 1]),
        Err(RagError::DataIntegrity(_))
    ));
}

#[test]
fn load_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = FlatIndex::load(temp_dir.path().join("missing.bin"));
    assert!(matches!(result, Err(RagError::MissingIndexFile(_))));
}
