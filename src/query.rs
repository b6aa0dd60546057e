use crate::config::Search;
use anyhow::Result;
use url::Url;

/// 将关键词转换为搜索页地址，本身就是 URL 的话原样返回
pub fn make_url(input: &str, search: &Search) -> Result<String> {
    let input = input.trim();
    if input.starts_with("http") {
        return Ok(input.to_owned());
    }
    let mut url = Url::parse(&search.url)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", input);
        for (k, v) in &search.params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url.into())
}
