//! The `go-to` flow: a guided search session over stdin

use crate::app::{App, Submitted};
use anyhow::Result;
use seeker_core::search::describe_result;
use seeker_core::session::SessionState;
use seeker_core::{
    autocorrect_title, Details, FetchStrategy, MediaKind, ProgressTracker, Scope, SeekerError,
    Step,
};
use std::io::{BufRead, Write};

/// Line-oriented prompts over any reader and writer
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask a question; `None` once input is exhausted
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

/// Blank means the default strategy
pub fn parse_fetch_mode(answer: &str) -> std::result::Result<FetchStrategy, String> {
    if answer.trim().is_empty() {
        return Ok(FetchStrategy::default());
    }
    answer.trim().parse()
}

/// Blank means no
pub fn parse_proxy_choice(answer: &str) -> Option<bool> {
    if answer.trim().is_empty() {
        return Some(false);
    }
    parse_yes_no(answer)
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Positive number, or `None` for a blank answer
pub fn parse_number(answer: &str, field: &str) -> std::result::Result<Option<u32>, String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Ok(None);
    }
    match answer.parse::<u32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(format!("{} must be a positive number", field)),
    }
}

pub fn parse_scope(answer: &str) -> Option<Scope> {
    match answer.trim().to_lowercase().as_str() {
        "" | "s" | "season" => Some(Scope::Season),
        "a" | "all" | "all seasons" => Some(Scope::AllSeasons),
        _ => None,
    }
}

/// Comma or space separated 1-based picks, returned 0-based without repeats
pub fn parse_selection(answer: &str, count: usize) -> std::result::Result<Vec<usize>, String> {
    let mut picks = Vec::new();
    for part in answer
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
    {
        let n: usize = part
            .parse()
            .map_err(|_| format!("{} is not a result number", part))?;
        if n == 0 || n > count {
            return Err(format!("Pick numbers between 1 and {}", count));
        }
        if !picks.contains(&(n - 1)) {
            picks.push(n - 1);
        }
    }
    Ok(picks)
}

const PROXY_NOT_CONFIGURED: &str =
    "FlareSolverr is not configured. Set FLARESOLVERR_URL or run `seeker config flaresolverr <url>`.";

enum Flow {
    Next(std::result::Result<Step, SeekerError>),
    Retry(String),
    Cancel,
}

/// Run one guided search for `user`, then offer downloads
pub async fn run_go_to<R: BufRead, W: Write>(
    app: &App,
    user: &str,
    prompter: &mut Prompter<R, W>,
    track: bool,
) -> Result<()> {
    let base_url = app.base_url()?;
    let session = app.sessions.start(user);
    let id = session.id.clone();

    let mut step = Step::Prompt(session.state);
    let plan = loop {
        let state = match &step {
            Step::Search(plan) => break plan.clone(),
            Step::Prompt(state) => *state,
        };

        let flow = match state {
            SessionState::AwaitingFetchMode => {
                match prompter.ask("Fetch mode [direct/proxy/browser/headed] (direct): ")? {
                    None => Flow::Cancel,
                    Some(answer) => match parse_fetch_mode(&answer) {
                        Ok(FetchStrategy::Proxy)
                            if !app.search.fetcher().proxy().is_configured() =>
                        {
                            Flow::Retry(PROXY_NOT_CONFIGURED.to_string())
                        }
                        Ok(strategy) => {
                            Flow::Next(app.sessions.choose_fetch_mode(&id, user, strategy))
                        }
                        Err(e) => Flow::Retry(e),
                    },
                }
            }
            SessionState::AwaitingProxyChoice => {
                match prompter.ask("Use FlareSolverr for detail pages? [y/n] (n): ")? {
                    None => Flow::Cancel,
                    Some(answer) => match parse_proxy_choice(&answer) {
                        Some(true) if !app.search.fetcher().proxy().is_configured() => {
                            Flow::Retry(PROXY_NOT_CONFIGURED.to_string())
                        }
                        Some(use_proxy) => {
                            Flow::Next(app.sessions.choose_proxy(&id, user, use_proxy))
                        }
                        None => Flow::Retry("Answer y or n".to_string()),
                    },
                }
            }
            SessionState::AwaitingType => match prompter.ask("Type [movie/show]: ")? {
                None => Flow::Cancel,
                Some(answer) => match answer.parse::<MediaKind>() {
                    Ok(kind) => Flow::Next(app.sessions.choose_type(&id, user, kind)),
                    Err(e) => Flow::Retry(e),
                },
            },
            SessionState::AwaitingDetails => {
                let kind = app.sessions.get(&id, user)?.kind;
                match ask_details(prompter, kind)? {
                    None => Flow::Cancel,
                    Some(Err(e)) => Flow::Retry(e),
                    Some(Ok(details)) => {
                        let correction = autocorrect_title(&app.suggest, &details.name).await;
                        Flow::Next(app.sessions.submit_details(
                            &id,
                            user,
                            details,
                            Some(&correction.corrected),
                        ))
                    }
                }
            }
            SessionState::AwaitingCorrection => {
                let corrected = app.sessions.get(&id, user)?.corrected.unwrap_or_default();
                match prompter.ask(&format!("Did you mean \"{}\"? [y/n]: ", corrected))? {
                    None => Flow::Cancel,
                    Some(answer) => match parse_yes_no(&answer) {
                        Some(accept) => {
                            Flow::Next(app.sessions.confirm_correction(&id, user, accept))
                        }
                        None => Flow::Retry("Answer y or n".to_string()),
                    },
                }
            }
            SessionState::AwaitingScope => {
                let season = app.sessions.get(&id, user)?.season.unwrap_or(1);
                match prompter.ask(&format!(
                    "Search season {} only or all seasons? [season/all] (season): ",
                    season
                ))? {
                    None => Flow::Cancel,
                    Some(answer) => match parse_scope(&answer) {
                        Some(scope) => Flow::Next(app.sessions.choose_scope(&id, user, scope)),
                        None => Flow::Retry("Answer season or all".to_string()),
                    },
                }
            }
            SessionState::Searching | SessionState::Done => {
                return Err(SeekerError::InvalidTransition {
                    state: state.describe(),
                    action: "prompt",
                }
                .into())
            }
        };

        match flow {
            Flow::Cancel => {
                app.sessions.abandon(&id, user)?;
                prompter.say("Cancelled.")?;
                return Ok(());
            }
            Flow::Retry(message) => prompter.say(&format!("❌ {}", message))?,
            Flow::Next(Ok(next)) => step = next,
            Flow::Next(Err(e @ (SeekerError::SessionExpired | SeekerError::OwnershipViolation))) => {
                return Err(e.into())
            }
            Flow::Next(Err(e)) => prompter.say(&format!("❌ {}", e))?,
        }
    };

    if let Ok(session) = app.sessions.get(&id, user) {
        for line in session.summary() {
            prompter.say(&line)?;
        }
    }

    let tracker = ProgressTracker::new("go-to").with_publisher(|rendered| {
        if let Some(last) = rendered.lines().last() {
            eprintln!("{}", last);
        }
    });

    let outcome = match app.search.run_plan(&plan, &base_url, &tracker).await {
        Ok(outcome) => outcome,
        Err(e) => {
            prompter.say(&tracker.fail(&format!("Search failed: {}", e)))?;
            app.sessions.abandon(&id, user)?;
            return Err(e.into());
        }
    };
    if let Some(count) = outcome.season_count {
        app.sessions.record_season_count(&id, user, count)?;
    }
    app.sessions.finish(&id, user)?;

    let options = plan.search_options(&base_url);

    let mut choices = Vec::new();
    for search in outcome.outcomes {
        if search.results.is_empty() {
            prompter.say(&format!("No matches for \"{}\".", search.term))?;
            continue;
        }

        prompter.say(&format!("\nResults for \"{}\":", search.term))?;
        for (i, result) in search.results.iter().enumerate() {
            prompter.say(&describe_result(choices.len() + i, result))?;
        }
        let count = search.results.len();
        let token = app.results.save_results(search.results, options.clone());
        choices.extend((0..count).map(|i| (token.clone(), i)));
    }

    if choices.is_empty() {
        prompter.say(&tracker.complete(Some("No results found.")))?;
        return Ok(());
    }
    tracker.success(&format!("{} result(s) ready", choices.len()));
    prompter.say(&tracker.complete(None))?;

    if !app.qbit.is_configured() {
        prompter.say(
            "⚠️ qBittorrent is not configured. Run `seeker qbittorrent <host> <user> <pass>` to enable downloads.",
        )?;
        return Ok(());
    }

    let picks = loop {
        let Some(answer) = prompter.ask("Download which results? (e.g. 1,3; blank to skip): ")?
        else {
            return Ok(());
        };
        match parse_selection(&answer, choices.len()) {
            Ok(picks) => break picks,
            Err(e) => prompter.say(&format!("❌ {}", e))?,
        }
    };

    let mut submitted: Vec<Submitted> = Vec::new();
    for pick in picks {
        let (ref token, index) = choices[pick];
        let Some(resolved) = app.results.get_result(token, index) else {
            prompter.say(&format!(
                "❌ Result #{} expired. Run the search again.",
                pick + 1
            ))?;
            continue;
        };

        let name = resolved.result.name.clone();
        let sent = match app
            .search
            .resolve_download_link(&resolved.result, &resolved.options, &tracker)
            .await
        {
            Ok(link) => {
                app.send_to_qbittorrent(&link, resolved.options.search_type, &name)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match sent {
            Ok(download) => {
                prompter.say(&format!("✅ Sent {} to qBittorrent", name))?;
                submitted.push(download);
            }
            Err(e) => prompter.say(&format!("❌ Could not download {}: {}", name, e))?,
        }
    }

    if track && !submitted.is_empty() {
        let sink = |message: &str| eprintln!("{}", message);
        app.track_downloads(&submitted, &sink).await;
    }
    Ok(())
}

fn ask_details<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    kind: Option<MediaKind>,
) -> Result<Option<std::result::Result<Details, String>>> {
    if kind != Some(MediaKind::Show) {
        return Ok(prompter.ask("Movie name: ")?.map(|name| {
            Ok(Details {
                name,
                ..Details::default()
            })
        }));
    }

    let Some(name) = prompter.ask("Show name: ")? else {
        return Ok(None);
    };
    let Some(season) = prompter.ask("Season: ")? else {
        return Ok(None);
    };
    let Some(episode) = prompter.ask("Episode (blank for the whole season): ")? else {
        return Ok(None);
    };

    let parsed = parse_number(&season, "Season").and_then(|season| {
        Ok(Details {
            name,
            season,
            episode: parse_number(&episode, "Episode")?,
        })
    });
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use mockito::Matcher;
    use seeker_core::GoogleSuggest;
    use std::io::Cursor;

    #[test]
    fn test_parse_fetch_mode() {
        assert_eq!(parse_fetch_mode("").unwrap(), FetchStrategy::Direct);
        assert_eq!(parse_fetch_mode(" proxy ").unwrap(), FetchStrategy::Proxy);
        assert_eq!(
            parse_fetch_mode("headed").unwrap(),
            FetchStrategy::Browser { headless: false }
        );
        assert!(parse_fetch_mode("carrier pigeon").is_err());
    }

    #[test]
    fn test_parse_answers() {
        assert_eq!(parse_yes_no("Y"), Some(true));
        assert_eq!(parse_yes_no("no"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
        assert_eq!(parse_proxy_choice(""), Some(false));
        assert_eq!(parse_proxy_choice("yes"), Some(true));
        assert_eq!(parse_proxy_choice("sure"), None);

        assert_eq!(parse_number("", "Season"), Ok(None));
        assert_eq!(parse_number(" 3 ", "Season"), Ok(Some(3)));
        assert!(parse_number("0", "Season").is_err());
        assert!(parse_number("three", "Season").is_err());

        assert_eq!(parse_scope(""), Some(Scope::Season));
        assert_eq!(parse_scope("ALL"), Some(Scope::AllSeasons));
        assert_eq!(parse_scope("episode"), None);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1, 3 3", 4), Ok(vec![0, 2]));
        assert_eq!(parse_selection("", 4), Ok(vec![]));
        assert!(parse_selection("5", 4).is_err());
        assert!(parse_selection("0", 4).is_err());
        assert!(parse_selection("two", 4).is_err());
    }

    #[test]
    fn test_cancel_on_end_of_input() {
        let mut config = Config::default();
        config.set("website", "www.site.fun").unwrap();
        let app = App::new(config).unwrap();

        let mut prompter = Prompter::new(Cursor::new("direct\nn\n"), Vec::new());
        tokio_test::block_on(run_go_to(&app, "alice", &mut prompter, false)).unwrap();

        let output = String::from_utf8(prompter.into_output()).unwrap();
        assert!(output.contains("Use FlareSolverr for detail pages? [y/n] (n): "));
        assert!(output.contains("Type [movie/show]: "));
        assert!(output.ends_with("Cancelled.\n"));
        assert!(app.sessions.is_empty());
    }

    #[test]
    fn test_flaresolverr_choice_needs_endpoint() {
        let mut config = Config::default();
        config.set("website", "www.site.fun").unwrap();
        let app = App::new(config).unwrap();

        let mut prompter = Prompter::new(Cursor::new("headed\nmaybe\ny\n"), Vec::new());
        tokio_test::block_on(run_go_to(&app, "alice", &mut prompter, false)).unwrap();

        let output = String::from_utf8(prompter.into_output()).unwrap();
        assert!(output.contains("❌ Answer y or n"));
        assert!(output.contains("❌ FlareSolverr is not configured"));
        assert!(!output.contains("Type [movie/show]: "));
        assert!(output.ends_with("Cancelled.\n"));
    }

    #[tokio::test]
    async fn test_movie_search_flow() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/complete/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"["the matrx",["the matrix"]]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/search/all/the-matrix/")
            .with_status(200)
            .with_body(
                r#"<table class="table2"><tbody>
                <tr><td><a href="/torrent/1.html">The Matrix 720p</a></td><td>700 MB</td><td>10</td></tr>
                <tr><td><a href="/torrent/2.html">The Matrix 1080p</a></td><td>1.4 GB</td><td>50</td></tr>
                </tbody></table>"#,
            )
            .create_async()
            .await;

        let mut config = Config::default();
        config.set("website", &server.url()).unwrap();
        let mut app = App::new(config).unwrap();
        app.suggest = GoogleSuggest::with_endpoint(
            app.search.fetcher().client().clone(),
            &format!("{}/complete/search", server.url()),
        );

        let input = "carrier pigeon\ndirect\n\nmovie\nthe matrx\ny\n";
        let mut prompter = Prompter::new(Cursor::new(input), Vec::new());
        run_go_to(&app, "alice", &mut prompter, false).await.unwrap();

        let output = String::from_utf8(prompter.into_output()).unwrap();
        assert!(output.contains("❌ Unknown fetch mode"));
        assert!(output.contains("Did you mean \"The Matrix\"? [y/n]: "));
        assert!(output.contains("Movie: The Matrix"));
        assert!(output.contains("FlareSolverr: no"));
        assert!(output.contains("⏳ Searching for \"The Matrix\""));
        assert!(output.contains("⏳ Search finished via"));
        assert!(output.contains("✅ 2 result(s) ready"));
        assert!(output.contains("1. The Matrix 1080p"));
        assert!(output.contains("2. The Matrix 720p"));
        assert!(output.contains("qBittorrent is not configured"));
        assert!(app.sessions.is_empty());
        assert_eq!(app.results.len(), 1);
    }
}
