use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressIterator};
use log::{debug, info, warn};
use regex::Regex;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_tar::Archive;
use walkdir::WalkDir;

use super::types::*;
use crate::DocDB;
use crate::document::ChainedBuilder;
use crate::metrics::{self, DocumentStatus};
use crate::utils::{pb_style, pb_style_speed};

pub type Replace = Option<(Regex, String)>;

/// 按 `--replace` 处理图片路径，得到文档标识
pub fn rename<'a>(path: &'a str, replace: &Replace) -> Cow<'a, str> {
    match replace {
        Some((re, replace)) => re.replace(path, replace.as_str()),
        None => Cow::Borrowed(path),
    }
}

pub fn task_scan(
    path: PathBuf,
    pb: ProgressBar,
    stats: Arc<IndexStats>,
    regex_suf: Regex,
) -> (JoinHandle<Result<()>>, Receiver<ImageData>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        if path.is_dir() {
            scan_directory(path, tx, regex_suf, pb, stats).await
        } else if is_tar(&path) {
            scan_tar(path, tx, regex_suf, pb).await
        } else {
            scan_list(path, tx, pb, stats).await
        }
    });
    (t, rx)
}

pub fn task_hash(mut lrx: Receiver<ImageData>) -> (JoinHandle<Result<()>>, Receiver<HashedImageData>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = spawn_blocking(move || {
        let mut buffer = vec![];
        let tx = &tx;
        // NOTE: 这里一次读取 cpu * 10 组数据，然后等待计算完成后再读取下一批
        // 这样可以避免同时 spawn 太多任务，导致内存占用过高
        while lrx.blocking_recv_many(&mut buffer, num_cpus::get() * 10) != 0 {
            rayon::scope(|s| {
                for data in buffer.drain(..) {
                    s.spawn(move |_| {
                        let hash = blake3::hash(&data.data).as_bytes().to_vec();
                        let _ = tx.blocking_send(HashedImageData { path: data.path, data: data.data, hash });
                    });
                }
            });
        }
        Ok(())
    });
    (t, rx)
}

pub fn task_filter(
    mut lrx: Receiver<HashedImageData>,
    pb: ProgressBar,
    db: Arc<DocDB>,
    stats: Arc<IndexStats>,
    overwrite: bool,
    replace: Replace,
) -> (JoinHandle<Result<()>>, Receiver<HashedImageData>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        while let Some(data) = lrx.recv().await {
            if db.check_hash(&data.hash).await? {
                skip_existing(&db, &data.path, &data.hash, &pb, overwrite, &replace).await?;
                stats.record(DocumentStatus::Skipped);
                pb.inc(1);
            } else if tx.send(data).await.is_err() {
                break;
            }
        }
        Ok::<_, anyhow::Error>(())
    });
    (t, rx)
}

pub fn task_build(
    mut lrx: Receiver<HashedImageData>,
    pb: ProgressBar,
    builder: Arc<ChainedBuilder>,
    stats: Arc<IndexStats>,
    replace: Replace,
) -> (JoinHandle<Result<()>>, Receiver<BuiltDocument>) {
    let (tx, rx) = channel(num_cpus::get());
    let label = builder.builders().iter().map(|b| b.field_name()).collect::<Vec<_>>().join(",");
    let t = spawn_blocking(move || {
        let mut buffer = vec![];
        let (tx, pb, builder, stats, replace, label) = (&tx, &pb, &builder, &stats, &replace, &label);
        while lrx.blocking_recv_many(&mut buffer, num_cpus::get() * 10) != 0 {
            rayon::scope(|s| {
                for data in buffer.drain(..) {
                    s.spawn(move |_| {
                        let start = Instant::now();
                        let image = match image::load_from_memory(&data.data) {
                            Ok(image) => image.to_rgb8(),
                            Err(e) => {
                                pb.println(format!("无法解码图片 {}: {}", data.path, e));
                                warn!("无法解码图片 {}: {}", data.path, e);
                                stats.record(DocumentStatus::Failed);
                                pb.inc(1);
                                return;
                            }
                        };
                        let identifier = rename(&data.path, replace);
                        match builder.build(Some(&*identifier), &image) {
                            Ok(document) => {
                                metrics::observe_build_duration(label, start.elapsed().as_secs_f32());
                                debug!("已生成文档 {}: {} 个字段", data.path, document.len());
                                let _ = tx.blocking_send(BuiltDocument { path: data.path, hash: data.hash, document });
                            }
                            Err(e) => {
                                pb.println(format!("生成文档失败 {}: {}", data.path, e));
                                warn!("生成文档失败 {}: {}", data.path, e);
                                stats.record(DocumentStatus::Failed);
                                pb.inc(1);
                            }
                        }
                    });
                }
            });
        }
        Ok(())
    });
    (t, rx)
}

pub fn task_add(
    mut lrx: Receiver<BuiltDocument>,
    pb: ProgressBar,
    db: Arc<DocDB>,
    stats: Arc<IndexStats>,
    overwrite: bool,
    replace: Replace,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        while let Some(data) = lrx.recv().await {
            // 这里再检查一次，因为可能存在处理过程中新增的重复图片
            if db.check_hash(&data.hash).await? {
                skip_existing(&db, &data.path, &data.hash, &pb, overwrite, &replace).await?;
                stats.record(DocumentStatus::Skipped);
            } else {
                db.add_document(&data.hash, &data.document).await?;
                stats.record(DocumentStatus::Indexed);
                pb.set_message(data.path);
            }
            pb.inc(1);
        }
        Ok::<_, anyhow::Error>(())
    })
}

async fn skip_existing(
    db: &DocDB,
    path: &str,
    hash: &[u8],
    pb: &ProgressBar,
    overwrite: bool,
    replace: &Replace,
) -> Result<()> {
    if overwrite {
        let identifier = rename(path, replace);
        db.update_identifier(hash, &identifier).await?;
        pb.set_message(format!("更新图片标识: {}", identifier));
    } else {
        pb.set_message(format!("跳过已添加图片: {}", path));
    }
    Ok(())
}

fn is_tar(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("tar"))
}

async fn scan_directory(
    path: PathBuf,
    tx: Sender<ImageData>,
    regex_suf: Regex,
    pb: ProgressBar,
    stats: Arc<IndexStats>,
) -> Result<()> {
    info!("开始扫描目录: {}", path.display());
    let pb2 = ProgressBar::no_length().with_style(pb_style());
    let entries = WalkDir::new(path)
        .into_iter()
        .progress_with(pb2)
        .filter_map(|entry| {
            entry.ok().and_then(|entry| {
                let path = entry.path();
                if path.is_file() {
                    if let Some(ext) = path.extension() {
                        if regex_suf.is_match(&ext.to_string_lossy()) {
                            return Some(path.to_string_lossy().to_string());
                        }
                    }
                }
                None
            })
        })
        .collect::<Vec<_>>();
    info!("扫描完成，共 {} 张图片", entries.len());

    pb.set_length(entries.len() as u64);
    send_files(entries, tx, pb, stats).await;
    Ok(())
}

/// 每行一个图片路径，忽略空行和 `#` 开头的行
async fn scan_list(path: PathBuf, tx: Sender<ImageData>, pb: ProgressBar, stats: Arc<IndexStats>) -> Result<()> {
    info!("读取图片列表: {}", path.display());
    let content = tokio::fs::read_to_string(&path).await?;
    let entries = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect::<Vec<_>>();
    info!("共 {} 张图片", entries.len());

    pb.set_length(entries.len() as u64);
    send_files(entries, tx, pb, stats).await;
    Ok(())
}

async fn send_files(entries: Vec<String>, tx: Sender<ImageData>, pb: ProgressBar, stats: Arc<IndexStats>) {
    futures::stream::iter(entries)
        .for_each_concurrent(32, |entry| async {
            match tokio::fs::read(&entry).await {
                Ok(data) => {
                    let _ = tx.send(ImageData { path: entry, data }).await;
                }
                Err(e) => {
                    pb.println(format!("无法读取图片 {}: {}", entry, e));
                    warn!("无法读取图片 {}: {}", entry, e);
                    stats.record(DocumentStatus::Failed);
                    pb.inc(1);
                }
            }
        })
        .await;
}

async fn scan_tar(path: PathBuf, tx: Sender<ImageData>, re_suf: Regex, pb: ProgressBar) -> Result<()> {
    info!("开始读取归档: {}", path.display());
    let file = File::open(path).await?;
    let mut archive = Archive::new(file);
    let mut entries = archive.entries()?;

    pb.set_style(pb_style_speed());

    // NOTE: tar 的 entries 必须按顺序读取，不能乱序并发
    while let Some(entry) = entries.next().await {
        let mut entry = entry?;
        let path = entry.path()?;
        // 跳过不符合条件的文件
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let Some(ext) = path.extension() else {
            continue;
        };
        if !re_suf.is_match(&ext.to_string_lossy()) {
            continue;
        }

        let path = path.to_string_lossy().to_string();

        let mut data = Vec::with_capacity(entry.header().size()? as usize);
        entry.read_to_end(&mut data).await?;

        if tx.send(ImageData { path, data }).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename() {
        let replace = Some((Regex::new(r"/path/to/(?<name>[0-9]+)\.jpg").unwrap(), "$name".to_string()));
        assert_eq!(rename("/path/to/123.jpg", &replace), "123");
        assert_eq!(rename("/other/1.jpg", &replace), "/other/1.jpg");
        assert_eq!(rename("/path/to/123.jpg", &None), "/path/to/123.jpg");
    }

    #[test]
    fn test_is_tar() {
        assert!(is_tar(Path::new("images.TAR")));
        assert!(!is_tar(Path::new("images.txt")));
    }
}
