use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

macro_rules! cmd {
    ($cmd:expr, $($args:expr),*) => {{
        {
            let mut cmd = Command::new($cmd);
            $(cmd.arg($args);)*
            cmd.assert()
        }
    }};
}

/// 生成三张内容不同的图片
fn make_dataset(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for i in 0..3u32 {
        let image = RgbImage::from_fn(64 + i * 16, 48, |x, y| Rgb([(x * 4 + i * 60) as u8, (y * 5) as u8, (i * 80) as u8]));
        image.save(dir.join(format!("image{i}.png")))?;
    }
    Ok(())
}

/// 黑底上有若干白色方块的图片，用于局部特征
fn make_blobs(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for i in 0..3u32 {
        let mut image = RgbImage::new(160, 120);
        for (x0, y0) in [(30 + i * 10, 40), (100, 60 - i * 8)] {
            for y in y0..y0 + 12 {
                for x in x0..x0 + 12 {
                    image.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        image.save(dir.join(format!("blobs{i}.png")))?;
    }
    Ok(())
}

#[fixture]
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    make_dataset(&dir.path().join("dataset")).unwrap();
    dir
}

#[test]
fn features() -> Result<()> {
    cargo_run!("imdoc", "features")
        .success()
        .stdout(predicate::str::contains("ColorLayout"))
        .stdout(predicate::str::contains("cl_hash"))
        .stdout(predicate::str::contains("su_vw"));
    Ok(())
}

#[rstest]
fn invalid_feature_options(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let image = workspace.path().join("dataset").join("image0.png");

    cargo_run!("imdoc", "-c", &conf_dir, "show", "--feature", "cl,cl", &image)
        .failure()
        .stderr(predicate::str::contains("已注册"));
    cargo_run!("imdoc", "-c", &conf_dir, "show", "-S", "0", &image).failure();

    Ok(())
}

#[rstest]
fn visual_words(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let blobs = workspace.path().join("blobs");
    make_blobs(&blobs)?;

    // 没有局部特征时无法训练
    cargo_run!("imdoc", "-c", &conf_dir, "index", workspace.path().join("dataset")).success();
    cargo_run!("imdoc", "-c", &conf_dir, "visual-words", "-k", "2").failure();

    cargo_run!("imdoc", "-c", &conf_dir, "index", "--local", "su", &blobs)
        .success()
        .stdout(predicate::str::contains("成功 3 张"));
    cargo_run!("imdoc", "-c", &conf_dir, "visual-words", "-k", "2", "-d", "10")
        .success()
        .stdout(predicate::str::contains("已更新 3 个文档的视觉词"));
    assert!(conf_dir.join("visual_words.bin").exists());

    cargo_run!("imdoc", "-c", &conf_dir, "show", "--local", "su", blobs.join("blobs0.png"))
        .success()
        .stdout(predicate::str::contains("\"su\""))
        .stdout(predicate::str::contains("\"su_vw\""));

    Ok(())
}

#[rstest]
fn index_directory_twice(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let dataset = workspace.path().join("dataset");

    cargo_run!("imdoc", "-c", &conf_dir, "index", &dataset)
        .success()
        .stdout(predicate::str::contains("成功 3 张，跳过 0 张，失败 0 张"));
    cargo_run!("imdoc", "-c", &conf_dir, "index", &dataset)
        .success()
        .stdout(predicate::str::contains("成功 0 张，跳过 3 张，失败 0 张"));

    Ok(())
}

#[rstest]
fn broken_image_does_not_abort(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let dataset = workspace.path().join("dataset");
    fs::write(dataset.join("broken.png"), b"definitely not a png")?;

    cargo_run!("imdoc", "-c", &conf_dir, "index", "--feature", "cl,eh", &dataset)
        .success()
        .stdout(predicate::str::contains("成功 3 张，跳过 0 张，失败 1 张"));

    Ok(())
}

#[rstest]
fn index_list_file(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let dataset = workspace.path().join("dataset");
    let list = workspace.path().join("images.txt");
    let content = format!(
        "# images\n{}\n\n{}\n{}\n",
        dataset.join("image0.png").display(),
        dataset.join("image1.png").display(),
        dataset.join("missing.png").display()
    );
    fs::write(&list, content)?;

    cargo_run!("imdoc", "-c", &conf_dir, "index", &list)
        .success()
        .stdout(predicate::str::contains("成功 2 张，跳过 0 张，失败 1 张"));

    Ok(())
}

#[rstest]
fn index_tar(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let tar_path = workspace.path().join("dataset.tar");

    cmd!("tar", "cf", &tar_path, "-C", workspace.path(), "dataset").success();

    cargo_run!("imdoc", "-c", &conf_dir, "index", &tar_path)
        .success()
        .stdout(predicate::str::contains("成功 3 张"));

    Ok(())
}

#[rstest]
#[case::bit_sampling("bit-sampling")]
#[case::lsh("lsh")]
fn show_with_hash(workspace: TempDir, #[case] mode: &str) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let image = workspace.path().join("dataset").join("image0.png");

    cargo_run!("imdoc", "-c", &conf_dir, "hashes", "--seed", "1").success();
    // 已存在时需要 --force
    cargo_run!("imdoc", "-c", &conf_dir, "hashes").failure();
    cargo_run!("imdoc", "-c", &conf_dir, "hashes", "--force").success();

    cargo_run!("imdoc", "-c", &conf_dir, "show", "--hash", "--hash-mode", mode, &image)
        .success()
        .stdout(predicate::str::contains("\"cl_hash\""))
        .stdout(predicate::str::contains("\"binary\""));

    Ok(())
}

#[rstest]
fn show_without_hash_functions(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let image = workspace.path().join("dataset").join("image1.png");

    cargo_run!("imdoc", "-c", &conf_dir, "show", "--hash", &image)
        .success()
        .stdout(predicate::str::contains("\"cl\""))
        .stdout(predicate::str::contains("cl_hash").not());

    Ok(())
}

#[rstest]
fn show_against(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let dataset = workspace.path().join("dataset");

    cargo_run!(
        "imdoc",
        "-c",
        &conf_dir,
        "show",
        "--feature",
        "cl,oh",
        dataset.join("image0.png"),
        "--against",
        dataset.join("image2.png")
    )
    .success()
    .stdout(predicate::str::contains("\"distances\""))
    .stdout(predicate::str::contains("\"oh\""));

    Ok(())
}

#[rstest]
fn export_failure_reports_progress(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    let dataset = workspace.path().join("dataset");

    cargo_run!("imdoc", "-c", &conf_dir, "index", &dataset).success();
    cargo_run!("imdoc", "-c", &conf_dir, "export", "--url", "http://127.0.0.1:9/solr/lire", "--retries", "1")
        .failure()
        .stderr(predicate::str::contains("已成功导出 0 个文档"));

    Ok(())
}

#[rstest]
fn malformed_config_is_fatal(workspace: TempDir) -> Result<()> {
    let conf_dir = workspace.path().join("conf");
    fs::create_dir_all(&conf_dir)?;
    fs::write(conf_dir.join("config.json"), "{ broken")?;

    cargo_run!("imdoc", "-c", &conf_dir, "export").failure().stderr(predicate::str::contains("config.json"));

    Ok(())
}
