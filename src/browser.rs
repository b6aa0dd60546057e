use crate::config;
use crate::cookie::Cookie;
use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams, TimeSinceEpoch};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// 一次浏览器会话
pub struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    /// 浏览器由本程序启动，而非连接到已有实例
    launched: bool,
    pub page: Page,
}

impl Session {
    /// 启动浏览器，写入 cookie 后打开 url
    pub async fn open(config: &config::Browser, cookies: &[Cookie], url: &str) -> Result<Self> {
        let launched = launches_browser(config);
        let (browser, mut handler) = match &config.remote_debugging_url {
            Some(remote) => {
                info!("连接到已有的浏览器: {}", remote);
                Browser::connect(remote.as_str())
                    .await
                    .context("无法连接到浏览器")?
            }
            None => {
                let mut builder = BrowserConfig::builder()
                    .request_timeout(Duration::from_secs(config.navigation_timeout_secs))
                    .arg("--disable-dev-shm-usage");
                if !config.headless {
                    builder = builder.with_head();
                }
                if let Some(executable) = &config.executable {
                    builder = builder.chrome_executable(executable);
                }
                Browser::launch(builder.build().map_err(|e| anyhow!(e))?)
                    .await
                    .context("无法启动浏览器")?
            }
        };

        // 浏览器事件需要持续处理，否则所有请求都会卡住
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("浏览器事件出错: {}", e);
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.set_user_agent(config.user_agent.as_str()).await?;

        if !cookies.is_empty() {
            let params = cookies
                .iter()
                .map(|cookie| to_cookie_param(cookie, url))
                .collect::<Result<Vec<_>>>()?;
            // 空白页不能设置 cookie，所以直接发送 CDP 命令
            page.execute(SetCookiesParams::new(params))
                .await
                .context("写入 cookie 失败")?;
        }

        info!("打开页面: {}", url);
        timeout(
            Duration::from_secs(config.navigation_timeout_secs),
            page.goto(url),
        )
        .await
        .context("页面加载超时")?
        .context("页面加载失败")?;
        sleep(Duration::from_millis(config.settle_ms)).await;

        Ok(Self {
            browser,
            handler,
            launched,
            page,
        })
    }

    /// 关闭会话
    ///
    /// 自己启动的浏览器整个关闭，连接到的浏览器只关闭打开的页面
    pub async fn close(self) -> Result<()> {
        let Session {
            mut browser,
            handler,
            launched,
            page,
        } = self;

        let result = if launched {
            match browser.close().await {
                Ok(_) => browser.wait().await.map(drop).map_err(Into::into),
                Err(e) => Err(e.into()),
            }
        } else {
            page.close().await.map_err(Into::into)
        };
        handler.abort();
        result
    }
}

/// 未指定远程地址时由本程序启动浏览器，会话结束时也由本程序关闭
fn launches_browser(config: &config::Browser) -> bool {
    config.remote_debugging_url.is_none()
}

/// url 为即将打开的页面，cookie 在导航前写入
fn to_cookie_param(cookie: &Cookie, url: &str) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .url(url)
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expiry) = cookie.expiry {
        builder = builder.expires(TimeSinceEpoch::new(expiry as f64));
    }
    builder.build().map_err(|e| anyhow!(e))
}
