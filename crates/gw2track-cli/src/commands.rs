//! Command implementations. Each prints to stdout; errors bubble up to `main`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;

use gw2track_core::services::maps::{DEFAULT_CONTINENT, DEFAULT_FLOOR};
use gw2track_core::tracker::{Resource, Tracker};
use gw2track_core::utils::{format_age, percent, truncate};

/// Maximum width of names in list output
const NAME_WIDTH: usize = 40;

pub async fn dispatch(tracker: &mut Tracker, command: &str, args: &[String]) -> Result<()> {
    let refresh = args.iter().any(|a| a == "--refresh");
    match command {
        "users" => users(tracker),
        "add-user" => {
            let (name, key) = match args {
                [name, key, ..] => (name, key),
                _ => bail!("Usage: gw2track add-user <name> <api-key>"),
            };
            let user = tracker.add_user(name, key).await?;
            println!("Added {} ({})", user.display_name(), user.id);
            Ok(())
        }
        "remove-user" => {
            let id = required(args, 0, "user-id")?;
            let summary = tracker.remove_user(id)?;
            println!(
                "Removed user {}: {} achievement rows, {} mastery rows, {} map rows, {} cache entries",
                id, summary.achievements, summary.masteries, summary.maps, summary.cache_entries
            );
            Ok(())
        }
        "rename-user" => {
            let id = required(args, 0, "user-id")?;
            let name = required(args, 1, "name")?;
            let user = tracker.rename_user(id, name)?;
            println!("Renamed to {}", user.display_name());
            Ok(())
        }
        "catalog" => catalog(tracker, refresh).await,
        "progress" => {
            let id = required(args, 0, "user-id")?;
            progress(tracker, id, refresh).await
        }
        "sync" => sync(tracker).await,
        "common-incomplete" => common_incomplete(tracker, args),
        "waypoints" => waypoints(tracker, args).await,
        "mark-map" => {
            let user_id = required(args, 0, "user-id")?;
            let map_id: u32 = required(args, 1, "map-id")?
                .parse()
                .context("map-id must be a number")?;
            let completed = !args.iter().any(|a| a == "--undo");
            tracker.maps().set_map_completed(user_id, map_id, completed)?;
            println!(
                "Map {} marked {}",
                map_id,
                if completed { "complete" } else { "incomplete" }
            );
            Ok(())
        }
        "sweep-cache" => {
            let removed = tracker.api().cache().sweep_expired();
            println!("Removed {} expired cache entries", removed);
            Ok(())
        }
        "clear-cache" => {
            let prefix = args.first().map(String::as_str);
            let removed = tracker.api().cache().clear(prefix);
            println!("Removed {} cache entries", removed);
            Ok(())
        }
        other => bail!("Unknown command '{}'. Run `gw2track --help` for usage.", other),
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .ok_or_else(|| anyhow!("Missing argument <{}>", name))
}

fn describe<T>(resource: &Resource<Vec<T>>) -> String {
    match resource {
        Resource::Empty => "not loaded".to_string(),
        Resource::Fetching { .. } => "loading".to_string(),
        Resource::Populated { value, stale: false } => value.len().to_string(),
        Resource::Populated { value, stale: true } => format!("{} (stale)", value.len()),
    }
}

fn users(tracker: &Tracker) -> Result<()> {
    if tracker.users().is_empty() {
        println!("No users. Add one with `gw2track add-user <name> <api-key>`.");
        return Ok(());
    }
    let now = Utc::now();
    for user in tracker.users() {
        let synced = user
            .last_synced
            .map(|at| format_age(at, now))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<36}  {:<width$}  synced {}",
            user.id,
            truncate(&user.display_name(), NAME_WIDTH),
            synced,
            width = NAME_WIDTH
        );
    }
    Ok(())
}

async fn catalog(tracker: &mut Tracker, refresh: bool) -> Result<()> {
    let result = tracker.load_catalogs(refresh).await;
    println!("Achievements: {}", describe(tracker.achievement_catalog()));
    println!("Categories:   {}", tracker.achievements().categories()?.len());
    println!("Masteries:    {}", describe(tracker.mastery_catalog()));
    println!("Maps:         {}", describe(tracker.map_catalog()));
    Ok(result?)
}

async fn progress(tracker: &mut Tracker, user_id: &str, refresh: bool) -> Result<()> {
    tracker.load_user_progress(user_id, refresh).await?;
    let user = tracker
        .user(user_id)
        .ok_or_else(|| anyhow!("Unknown user {}", user_id))?;
    println!("{}", user.display_name());

    let store = tracker.store();
    let total = store.achievement_count()?;
    let done = tracker.achievements().completed(user_id)?.len();
    println!(
        "  Achievements: {}/{} done ({}%)",
        done,
        total,
        percent(done, total)
    );

    let unlocked = tracker
        .user_masteries(user_id)
        .and_then(Resource::value)
        .cloned()
        .unwrap_or_default();
    let levels: u32 = unlocked.iter().map(|m| m.level).sum();
    println!(
        "  Masteries:    {} tracks, {} levels unlocked",
        unlocked.len(),
        levels
    );

    let maps = tracker.maps().get_user_progress(user_id)?;
    let completed = maps.iter().filter(|m| m.completed).count();
    let map_total = store.map_count()?;
    println!(
        "  Maps:         {}/{} completed ({}%)",
        completed,
        map_total,
        percent(completed, map_total)
    );
    Ok(())
}

async fn sync(tracker: &mut Tracker) -> Result<()> {
    let summary = tracker.sync_all_users().await?;
    println!(
        "Synced {} of {} users",
        summary.fully_synced.len(),
        tracker.users().len()
    );
    for (domain, failure) in summary.failures() {
        println!("  {} failed for {}: {}", domain, failure.user_name, failure.error);
    }
    Ok(())
}

fn common_incomplete(tracker: &Tracker, user_ids: &[String]) -> Result<()> {
    if user_ids.is_empty() {
        bail!("Usage: gw2track common-incomplete <user-id>...");
    }
    let achievements = tracker.achievements().common_incomplete(user_ids)?;
    for achievement in &achievements {
        println!("{:>6}  {}", achievement.id, truncate(&achievement.name, NAME_WIDTH * 2));
    }
    println!("{} achievements incomplete for all selected users", achievements.len());
    Ok(())
}

async fn waypoints(tracker: &Tracker, args: &[String]) -> Result<()> {
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let continent = match positional.first() {
        Some(c) => c.parse().context("continent must be a number")?,
        None => DEFAULT_CONTINENT,
    };
    let floor = match positional.get(1) {
        Some(f) => f.parse().context("floor must be a number")?,
        None => DEFAULT_FLOOR,
    };
    let query = positional.get(2).map(|q| q.as_str()).unwrap_or("");

    let waypoints = tracker
        .maps()
        .search_waypoints(query, continent, floor)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&waypoints)?);
        return Ok(());
    }
    for wp in &waypoints {
        println!(
            "{:<width$}  {:<24}  {}",
            truncate(&wp.name, NAME_WIDTH),
            truncate(&wp.map_name, 24),
            wp.coord_display(),
            width = NAME_WIDTH
        );
    }
    println!("{} waypoints", waypoints.len());
    Ok(())
}
