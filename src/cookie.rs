use crate::config;
use crate::utils::LogOnError;
use anyhow::{anyhow, Context, Result};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// 过期时间，unix 时间戳（秒）
    pub expiry: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

/// moz_cookies 表中的一行
#[derive(QueryableByName, Debug)]
struct MozCookie {
    #[sql_type = "Text"]
    name: String,
    #[sql_type = "Text"]
    value: String,
    #[sql_type = "Text"]
    host: String,
    #[sql_type = "Text"]
    path: String,
    #[sql_type = "BigInt"]
    expiry: i64,
    #[sql_type = "Integer"]
    is_secure: i32,
    #[sql_type = "Integer"]
    is_http_only: i32,
}

impl MozCookie {
    fn into_cookie(self, default_domain: &str) -> Cookie {
        Cookie {
            name: self.name,
            value: self.value,
            domain: if self.host.is_empty() {
                default_domain.to_owned()
            } else {
                self.host
            },
            path: if self.path.is_empty() {
                "/".to_owned()
            } else {
                self.path
            },
            expiry: Some(self.expiry).filter(|t| *t > 0).map(normalize_expiry),
            secure: self.is_secure != 0,
            http_only: self.is_http_only != 0,
        }
    }
}

/// 新版 Firefox 以毫秒保存过期时间
fn normalize_expiry(expiry: i64) -> i64 {
    if expiry > 100_000_000_000 {
        expiry / 1000
    } else {
        expiry
    }
}

/// 从本地 Firefox 读取 cookie，失败时返回空列表
pub fn load_firefox_cookies(config: &config::Cookie) -> Vec<Cookie> {
    try_load_firefox_cookies(config)
        .context("无法读取 Firefox cookie")
        .log_on_error()
        .unwrap_or_default()
}

fn try_load_firefox_cookies(config: &config::Cookie) -> Result<Vec<Cookie>> {
    let profile = match &config.profile {
        Some(profile) => profile.clone(),
        None => profile_roots()
            .iter()
            .find_map(|root| find_profile(root))
            .ok_or_else(|| anyhow!("找不到 Firefox 配置目录"))?,
    };
    debug!("Firefox 配置目录: {}", profile.display());
    read_cookie_db(&profile.join("cookies.sqlite"), &config.domain)
}

/// 各平台下 Firefox 配置目录所在的位置
fn profile_roots() -> Vec<PathBuf> {
    let mut roots = vec![];
    if let Ok(home) = env::var("HOME") {
        let home = PathBuf::from(home);
        roots.push(home.join(".mozilla/firefox"));
        roots.push(home.join("snap/firefox/common/.mozilla/firefox"));
        roots.push(home.join("Library/Application Support/Firefox/Profiles"));
    }
    if let Ok(appdata) = env::var("APPDATA") {
        roots.push(PathBuf::from(appdata).join("Mozilla/Firefox/Profiles"));
    }
    roots
}

/// 在 root 下寻找含有 cookies.sqlite 的配置目录，优先 default-release
pub fn find_profile(root: &Path) -> Option<PathBuf> {
    let mut profiles = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.join("cookies.sqlite").is_file())
        .collect::<Vec<_>>();
    profiles.sort();

    let rank = |path: &PathBuf| {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.ends_with(".default-release") {
            0
        } else if name.contains(".default") {
            1
        } else {
            2
        }
    };
    profiles.into_iter().min_by_key(rank)
}

/// 读取 cookie 数据库
///
/// Firefox 运行时会锁住数据库，所以先复制到临时目录再读取
pub fn read_cookie_db(db: &Path, domain: &str) -> Result<Vec<Cookie>> {
    let tmp = tempfile::tempdir()?;
    let copy = tmp.path().join("cookies.sqlite");
    fs::copy(db, &copy).with_context(|| format!("无法复制 {}", db.display()))?;
    for suffix in &["-wal", "-shm"] {
        let side = PathBuf::from(format!("{}{}", db.display(), suffix));
        if side.is_file() {
            fs::copy(&side, tmp.path().join(format!("cookies.sqlite{}", suffix)))?;
        }
    }

    let path = copy.to_str().context("临时路径不是合法的 UTF-8")?;
    let conn = SqliteConnection::establish(path)?;
    let rows = diesel::sql_query(
        "SELECT name, value, host, path, expiry, isSecure AS is_secure, \
         isHttpOnly AS is_http_only FROM moz_cookies WHERE host LIKE ?",
    )
    .bind::<Text, _>(format!("%{}", domain))
    .load::<MozCookie>(&conn)?;
    trace!("读取到 {} 行", rows.len());

    let now = chrono::Utc::now().timestamp();
    Ok(rows
        .into_iter()
        .map(|row| row.into_cookie(domain))
        .filter(|cookie| cookie.expiry.map_or(true, |t| t > now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::connection::SimpleConnection;

    fn make_profile(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cookies.sqlite"), b"").unwrap();
        dir
    }

    fn make_db(path: &Path) {
        let conn = SqliteConnection::establish(path.to_str().unwrap()).unwrap();
        conn.batch_execute(
            "CREATE TABLE moz_cookies (
                id INTEGER PRIMARY KEY,
                name TEXT, value TEXT, host TEXT, path TEXT,
                expiry INTEGER, isSecure INTEGER, isHttpOnly INTEGER
            );
            INSERT INTO moz_cookies (name, value, host, path, expiry, isSecure, isHttpOnly) VALUES
                ('NID', 'abc', '.google.com', '/', 4102444800, 1, 1),
                ('SOCS', 'xyz', 'www.google.com', '', 4102444800, 0, 0),
                ('OLD', 'gone', '.google.com', '/', 1000, 0, 0),
                ('other', 'nope', '.example.com', '/', 4102444800, 0, 0);",
        )
        .unwrap();
    }

    #[test]
    fn prefers_default_release() {
        let root = tempfile::tempdir().unwrap();
        make_profile(root.path(), "aaaa.default");
        let release = make_profile(root.path(), "bbbb.default-release");
        make_profile(root.path(), "cccc.dev-edition");
        assert_eq!(find_profile(root.path()), Some(release));
    }

    #[test]
    fn skips_profiles_without_cookies() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("xxxx.default-release")).unwrap();
        let other = make_profile(root.path(), "yyyy.work");
        assert_eq!(find_profile(root.path()), Some(other));
        assert_eq!(find_profile(&root.path().join("missing")), None);
    }

    #[test]
    fn reads_matching_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cookies.sqlite");
        make_db(&db);

        let mut cookies = read_cookie_db(&db, ".google.com").unwrap();
        cookies.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "NID");
        assert!(cookies[0].secure && cookies[0].http_only);
        assert_eq!(cookies[1].name, "SOCS");
        assert_eq!(cookies[1].domain, "www.google.com");
        assert_eq!(cookies[1].path, "/");
    }

    #[test]
    fn row_into_cookie() {
        let row = MozCookie {
            name: "NID".into(),
            value: "abc".into(),
            host: String::new(),
            path: String::new(),
            expiry: 4102444800000,
            is_secure: 1,
            is_http_only: 0,
        };
        let cookie = row.into_cookie(".google.com");
        assert_eq!(cookie.domain, ".google.com");
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.expiry, Some(4102444800));
        assert!(cookie.secure && !cookie.http_only);

        let session = MozCookie {
            name: "a".into(),
            value: "b".into(),
            host: "www.google.com".into(),
            path: "/x".into(),
            expiry: 0,
            is_secure: 0,
            is_http_only: 1,
        };
        let cookie = session.into_cookie(".google.com");
        assert_eq!(cookie.domain, "www.google.com");
        assert_eq!(cookie.path, "/x");
        assert_eq!(cookie.expiry, None);
    }

    #[test]
    fn expiry_in_millis() {
        assert_eq!(normalize_expiry(4102444800), 4102444800);
        assert_eq!(normalize_expiry(4102444800000), 4102444800);
    }

    #[test]
    fn failure_means_no_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let config = config::Cookie {
            domain: ".google.com".into(),
            profile: Some(dir.path().to_owned()),
        };
        assert!(load_firefox_cookies(&config).is_empty());
    }
}
