use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path, path::PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: Search,
    pub browser: Browser,
    pub collect: Collect,
    pub download: Download,
    pub cookie: Cookie,
    pub output: Output,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
    /// 搜索页地址，关键词以 `q` 参数附加
    pub url: String,
    /// 附加的查询参数，默认 `udm=2` 即图片搜索
    pub params: Vec<(String, String)>,
    /// 未指定关键词时使用的默认关键词
    pub default_query: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Browser {
    /// 是否使用无头模式
    pub headless: bool,
    pub user_agent: String,
    /// Chrome 可执行文件路径，不指定时自动查找
    pub executable: Option<PathBuf>,
    /// 连接已有的浏览器实例，而非启动新的
    pub remote_debugging_url: Option<String>,
    /// 页面加载超时
    pub navigation_timeout_secs: u64,
    /// 页面加载后额外等待的时间
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Collect {
    /// 滚动次数
    pub scroll_times: usize,
    /// 每次滚动后的等待时间
    pub scroll_delay_ms: u64,
    /// 点击「更多结果」后的等待时间
    pub more_delay_ms: u64,
    /// 「更多结果」按钮的选择器
    pub more_selector: String,
    /// 不收集这些域名下的图片
    pub skip_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Download {
    pub timeout_secs: u64,
    /// 小于该字节数的图片视为图标或缩略图
    pub min_size: usize,
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cookie {
    /// 只读取该域名下的 cookie
    pub domain: String,
    /// Firefox 配置目录，不指定时自动查找
    pub profile: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Output {
    pub images_dir: PathBuf,
    pub index: PathBuf,
    /// 页面的 lang 属性
    pub lang: String,
    /// 页面的 dir 属性
    pub dir: String,
}

impl Default for Search {
    fn default() -> Self {
        Self {
            url: "https://www.google.com/search".into(),
            params: vec![("udm".into(), "2".into())],
            default_query: "تم تعبئة الكرش".into(),
        }
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self {
            headless: false,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:137.0) Gecko/20100101 Firefox/137.0".into(),
            executable: None,
            remote_debugging_url: None,
            navigation_timeout_secs: 30,
            settle_ms: 3000,
        }
    }
}

impl Default for Collect {
    fn default() -> Self {
        Self {
            scroll_times: 15,
            scroll_delay_ms: 2000,
            more_delay_ms: 1500,
            more_selector: "input[value='Show more results']".into(),
            skip_domains: vec![
                "google.com".into(),
                "gstatic.com".into(),
                "googleapis.com".into(),
                "googleusercontent.com".into(),
            ],
        }
    }
}

impl Default for Download {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            min_size: 5_000,
            proxy: None,
        }
    }
}

impl Default for Cookie {
    fn default() -> Self {
        Self {
            domain: ".google.com".into(),
            profile: None,
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self {
            images_dir: "images".into(),
            index: "index.html".into(),
            lang: "ar".into(),
            dir: "rtl".into(),
        }
    }
}

impl Config {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(&path)?;
        let mut str = String::new();
        file.read_to_string(&mut str)?;
        Ok(toml::from_str(&str)?)
    }

    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("配置文件 {} 不存在，使用默认配置", path.display());
            return Ok(Self::default());
        }
        Self::new(path).with_context(|| format!("无法读取配置文件 {}", path.display()))
    }
}
