use std::path::Path;

use {anyhow::Result, pagemine_config::PolicyConfig, pagemine_policy::CrawlPolicyEngine};

pub async fn handle_robots(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = pagemine_config::load_or_discover(config_path)?;
    let policy = CrawlPolicyEngine::new(PolicyConfig {
        respect_robots: true,
        ..config.policy
    })?;

    let decision = policy.check_robots(url).await;
    let sitemaps = policy.sitemaps(url).await?;

    println!("url:         {url}");
    println!("user agent:  {}", policy.config().user_agent);
    println!(
        "allowed:     {}",
        if decision.allowed { "yes" } else { "no" }
    );
    println!("crawl delay: {}ms", decision.crawl_delay.as_millis());
    if sitemaps.is_empty() {
        println!("sitemaps:    (none)");
    } else {
        println!("sitemaps:");
        for sitemap in &sitemaps {
            println!("  {sitemap}");
        }
    }
    Ok(())
}
