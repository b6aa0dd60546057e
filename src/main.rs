#[macro_use]
extern crate log;
#[macro_use]
extern crate diesel;

use crate::browser::Session;
use crate::config::Config;
use crate::download::Downloader;
use crate::utils::LogOnError;
use anyhow::Result;
use getopts::Options;
use std::env;

mod browser;
mod collector;
mod config;
mod cookie;
mod download;
mod gallery;
mod query;
mod utils;

struct Args {
    config: String,
    gallery_only: bool,
    query: Option<String>,
}

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options] [QUERY | URL]", program);
    print!("{}", opts.usage(&brief));
}

fn parse_args() -> Option<Args> {
    let args = env::args().collect::<Vec<_>>();
    let program = args.first().cloned().unwrap_or_default();

    let mut opts = Options::new();
    opts.optopt("c", "config", "配置文件路径，默认为 config.toml", "FILE");
    opts.optflag("g", "gallery-only", "不抓取，只重新生成画廊页面");
    opts.optflag("h", "help", "显示帮助");

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program, opts);
            return None;
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return None;
    }

    Some(Args {
        config: matches
            .opt_str("c")
            .unwrap_or_else(|| "config.toml".to_owned()),
        gallery_only: matches.opt_present("g"),
        query: matches.free.first().cloned(),
    })
}

/// 抓取并下载图片，返回保存的数量
async fn scrape(config: &Config, input: &str) -> Result<usize> {
    let url = query::make_url(input, &config.search)?;
    info!("抓取中: {}", url);

    let cookies = cookie::load_firefox_cookies(&config.cookie);
    info!("读取到 {} 个 Firefox cookie", cookies.len());

    let session = Session::open(&config.browser, &cookies, &url).await?;
    let urls = collector::collect_image_urls(&session.page, &config.collect).await;
    session.close().await.log_on_error();
    info!("找到 {} 个候选图片地址", urls.len());

    let downloader = Downloader::new(
        &config.download,
        &config.browser.user_agent,
        &config.output.images_dir,
    )?;
    let saved = downloader.download_all(&urls).await;
    info!(
        "已下载 {} 张图片到 {}",
        saved,
        config.output.images_dir.display()
    );
    Ok(saved)
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    debug!("{:?}", config);

    if !args.gallery_only {
        let input = args
            .query
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| config.search.default_query.clone());
        scrape(&config, &input).await?;
    }
    gallery::build(&config.output)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("imgscrape=info"))
        .init();

    let args = match parse_args() {
        Some(args) => args,
        None => return,
    };
    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
