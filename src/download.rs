use crate::config::Download;
use crate::utils::truncate;
use anyhow::Result;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Proxy, Response};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

macro_rules! send {
    ($e:expr) => {
        $e.send().await.and_then(Response::error_for_status)
    };
}

/// 允许保存的图片格式
const IMAGE_EXTS: [&str; 5] = ["jpg", "png", "gif", "webp", "avif"];

pub struct Downloader {
    client: Client,
    min_size: usize,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(config: &Download, user_agent: &str, dir: &Path) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);

        let mut client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs));
        if let Some(proxy) = &config.proxy {
            client = client.proxy(Proxy::all(proxy)?)
        }

        fs::create_dir_all(dir)?;
        Ok(Self {
            client: client.build()?,
            min_size: config.min_size,
            dir: dir.to_owned(),
        })
    }

    /// 依次下载所有图片，返回保存的数量
    pub async fn download_all(&self, urls: &BTreeSet<String>) -> usize {
        let mut saved = 0;
        for url in urls {
            match self.download(url, saved).await {
                Ok(Some((path, size))) => {
                    saved += 1;
                    info!("[{}] 已保存 {} ({}KB)", saved, path.display(), size / 1024);
                }
                Ok(None) => (),
                Err(e) => warn!("[跳过] {}: {}", truncate(url, 70), e),
            }
        }
        saved
    }

    /// 下载单张图片，不符合条件时返回 None
    async fn download(&self, url: &str, index: usize) -> Result<Option<(PathBuf, usize)>> {
        debug!("下载图片中：{}", url);
        let response = send!(self.client.get(url))?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?;

        let ext = match image_extension(&bytes, content_type.as_deref(), self.min_size) {
            Some(ext) => ext,
            None => return Ok(None),
        };

        let path = self.dir.join(format!("img_{:04}.{}", index, ext));
        fs::write(&path, &bytes)?;
        Ok(Some((path, bytes.len())))
    }
}

/// 判断下载内容是否值得保存，返回应使用的扩展名
///
/// 过小的文件视为图标或缩略图，缺失 Content-Type 时视为 jpeg
pub fn image_extension(bytes: &[u8], content_type: Option<&str>, min_size: usize) -> Option<&'static str> {
    if bytes.len() < min_size {
        trace!("文件过小: {} 字节", bytes.len());
        return None;
    }
    let content_type = content_type.unwrap_or("image/jpeg");
    if !content_type.contains("image") {
        trace!("不是图片: {}", content_type);
        return None;
    }

    let subtype = content_type
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .replace("jpeg", "jpg");
    if let Some(ext) = IMAGE_EXTS.iter().copied().find(|ext| *ext == subtype) {
        return Some(ext);
    }

    // 根据文件头猜测格式
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .and_then(|ext| IMAGE_EXTS.iter().copied().find(|e| *e == ext))
        .or(Some("jpg"))
}
