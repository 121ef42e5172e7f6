//! Runs the YAML plan in `testdata/` end to end.

use etl_rules::context::Context;
use etl_rules::error::Result;
use etl_rules::frame::{BackendKind, Frame};
use etl_rules::plan::PlanMode;
use etl_rules::runner;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn testdata() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn output_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("etl_rules_plan_files_{test}_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn overrides(output_dir: &Path) -> Context {
    let mut context = Context::new();
    context.insert("input_dir", &*testdata().to_string_lossy());
    context.insert("output_dir", &*output_dir.to_string_lossy());
    context
}

fn column<'a>(df: &'a DataFrame, name: &str) -> &'a Series {
    df.column(name).unwrap().as_materialized_series()
}

fn i64s(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    column(df, name).cast(&DataType::Int64).unwrap().i64().unwrap().into_iter().collect()
}

fn f64s(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    column(df, name).cast(&DataType::Float64).unwrap().f64().unwrap().into_iter().collect()
}

fn strs(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    column(df, name).str().unwrap().into_iter().map(|v| v.map(str::to_owned)).collect()
}

fn check_outputs(dir: &Path) -> Result<()> {
    let per_genre = CsvReadOptions::default()
        .try_into_reader_with_file_path(Some(dir.join("per_genre.csv")))?
        .finish()?;
    assert_eq!(per_genre.height(), 3);
    assert_eq!(
        strs(&per_genre, "genre"),
        vec![Some("classic".to_owned()), Some("fantasy".to_owned()), Some("scifi".to_owned())]
    );
    assert_eq!(i64s(&per_genre, "id"), vec![Some(1), Some(2), Some(2)]);
    assert_eq!(f64s(&per_genre, "price"), vec![Some(7.25), Some(27.5), Some(20.0)]);
    assert_eq!(
        strs(&per_genre, "title"),
        vec![
            Some("Emma".to_owned()),
            Some("The hobbit,The silmarillion".to_owned()),
            Some("Dune,Neuromancer".to_owned()),
        ]
    );

    let file = fs::File::open(dir.join("expensive.parquet"))?;
    let expensive = ParquetReader::new(file).finish()?;
    assert_eq!(i64s(&expensive, "id"), vec![Some(1), Some(4), Some(5)]);
    assert_eq!(
        strs(&expensive, "author"),
        vec![Some("Tolkien".to_owned()), Some("Gibson".to_owned()), Some("Tolkien".to_owned())]
    );
    let ratio = f64s(&expensive, "price_per_page");
    assert!((ratio[0].unwrap() - 12.5 / 310.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_books_plan_eager() -> Result<()> {
    let dir = output_dir("eager");
    runner::run_file(testdata().join("books_plan.yml"), BackendKind::Polars, &overrides(&dir))?;
    check_outputs(&dir)
}

#[test]
fn test_books_plan_lazy() -> Result<()> {
    let dir = output_dir("lazy");
    runner::run_file(testdata().join("books_plan.yml"), BackendKind::PolarsLazy, &overrides(&dir))?;
    check_outputs(&dir)
}

#[test]
fn test_books_plan_named_outputs() -> Result<()> {
    let plan = runner::load_plan::<DataFrame>(testdata().join("books_plan.yml"))?;
    assert_eq!(plan.name(), Some("books report"));
    assert_eq!(plan.mode(), Some(PlanMode::Graph));
    assert_eq!(plan.len(), 8);
    assert!(plan.validate::<&str>(&[]).is_empty());

    let dir = output_dir("named");
    let data = runner::run_plan(&plan, &overrides(&dir))?;
    let cheap = data.get_named_output("cheap")?;
    assert_eq!(i64s(cheap, "id"), vec![Some(2), Some(3)]);
    let books = data.get_named_output("books")?;
    assert_eq!(
        strs(books, "title"),
        vec![
            Some("The hobbit".to_owned()),
            Some("Dune".to_owned()),
            Some("Emma".to_owned()),
            Some("Neuromancer".to_owned()),
            Some("The silmarillion".to_owned()),
        ]
    );
    assert_eq!(Frame::column_names(books)?.len(), 6);
    Ok(())
}

#[test]
fn test_context_defaults_come_from_the_plan() -> Result<()> {
    let context = runner::read_context(testdata().join("books_plan.yml"))?;
    assert_eq!(context.len(), 2);
    assert_eq!(
        context.get("input_dir").map(ToString::to_string),
        Some("testdata".to_owned())
    );
    Ok(())
}

const PATTERN_PLAN: &str = r"
name: stack parts
rules:
  - ReadCSVFileRule:
      file_name: 'books_part\d+\.csv'
      file_dir: '{context.dir}'
      regex: true
  - SortRule:
      sort_by: [id]
  - WriteCSVFileRule:
      file_name: '{context.output}'
      file_dir: '{context.dir}'
";

#[test]
fn test_plan_reads_every_matching_file() -> Result<()> {
    let dir = output_dir("pattern");
    fs::write(dir.join("books_part1.csv"), "id,title\n2,B\n")?;
    fs::write(dir.join("books_part2.csv"), "id,title\n3,C\n1,A\n")?;
    fs::write(dir.join("authors.csv"), "id,title\n9,Z\n")?;
    let plan_path = dir.join("plan.yml");
    fs::write(&plan_path, PATTERN_PLAN)?;

    for (backend, output) in [
        (BackendKind::Polars, "all_eager.csv"),
        (BackendKind::PolarsLazy, "all_lazy.csv"),
    ] {
        let mut context = Context::new();
        context.insert("dir", &*dir.to_string_lossy());
        context.insert("output", output);
        runner::run_file(&plan_path, backend, &context)?;

        let all = CsvReadOptions::default()
            .try_into_reader_with_file_path(Some(dir.join(output)))?
            .finish()?;
        assert_eq!(i64s(&all, "id"), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(
            strs(&all, "title"),
            vec![Some("A".to_owned()), Some("B".to_owned()), Some("C".to_owned())]
        );
    }
    Ok(())
}
