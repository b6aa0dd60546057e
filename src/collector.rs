use crate::config::Collect;
use crate::utils::LogOnError;
use anyhow::Result;
use chromiumoxide::Page;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 谷歌 JSON 数据中的原图字段 `"ou":"URL"`
static ORIGINAL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""ou"\s*:\s*"(https?://[^"]+)""#).unwrap());

/// 页面中任意位置出现的图片地址
static IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+\.(?:jpg|jpeg|png|webp|gif)"#).unwrap()
});

/// 地址中 `://` 与第一个 `/` 之间的部分，含用户信息和端口
static AUTHORITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://([^/]+)").unwrap());

/// 从页面源码中提取候选图片地址，加入 urls
pub fn extract_image_urls(content: &str, skip_domains: &[String], urls: &mut BTreeSet<String>) {
    for cap in ORIGINAL_URL.captures_iter(content) {
        urls.insert(cap[1].to_owned());
    }

    for m in IMAGE_URL.find_iter(content) {
        let url = m.as_str().trim_end_matches(&['\\', ',', ';', ')'][..]);
        if is_skipped(url, skip_domains) {
            continue;
        }
        urls.insert(url.to_owned());
    }
}

/// 找不到 authority 或其中包含 skip_domains 时跳过
fn is_skipped(url: &str, skip_domains: &[String]) -> bool {
    match AUTHORITY.captures(url) {
        Some(cap) => skip_domains.iter().any(|d| cap[1].contains(d.as_str())),
        None => true,
    }
}

/// 滚动一次页面，返回滚动后的页面源码
async fn scroll_once(page: &Page, config: &Collect) -> Result<String> {
    page.find_element("body").await?.press_key("End").await?;
    sleep(Duration::from_millis(config.scroll_delay_ms)).await;

    let content = page.content().await?;

    // 如果有「更多结果」按钮就点一下
    if let Ok(button) = page.find_element(config.more_selector.as_str()).await {
        match button.click().await {
            Ok(_) => sleep(Duration::from_millis(config.more_delay_ms)).await,
            Err(e) => debug!("点击「更多结果」失败: {}", e),
        }
    }
    Ok(content)
}

/// 按固定次数滚动页面，扫描每次返回的源码
///
/// 单次失败只记录日志，已收集的地址保留
async fn scan_rounds<F, Fut>(config: &Collect, mut scroll: F) -> BTreeSet<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut urls = BTreeSet::new();

    for i in 0..config.scroll_times {
        if let Some(content) = scroll().await.log_on_error() {
            extract_image_urls(&content, &config.skip_domains, &mut urls);
        }
        info!(
            "滚动 {}/{}: 已找到 {} 个地址",
            i + 1,
            config.scroll_times,
            urls.len()
        );
    }

    urls
}

/// 反复滚动页面，收集候选图片地址
pub async fn collect_image_urls(page: &Page, config: &Collect) -> BTreeSet<String> {
    scan_rounds(config, || scroll_once(page, config)).await
}
