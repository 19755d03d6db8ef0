use std::{process, sync::Arc};

use lexquery::{
    ApiClient, AppError, QueryState,
    api::{FetchEvents, FetchNews, FetchTicket, FetchTickets, NewsQuery, SendMessage},
    cache::Paginated,
    config::{self, ChatArgs, Command, NewsArgs, TicketsArgs},
    infra::{error::InfraError, telemetry},
    types::{Article, ChatRequest},
};
use serde::Serialize;
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let client = ApiClient::from_settings(&settings).map_err(InfraError::from)?;
    info!(
        base_url = %settings.api.base_url,
        grace_ms = settings.cache.grace_period.as_millis() as u64,
        "Client ready"
    );

    match cli_args.command {
        Command::Events => run_events(&client).await,
        Command::News(args) => run_news(&client, args).await,
        Command::Tickets(args) => run_tickets(&client, args).await,
        Command::Chat(args) => run_chat(&client, args).await,
    }?;

    debug!(stats = ?client.stats(), "Cache state at exit");
    Ok(())
}

async fn run_events(client: &ApiClient) -> Result<(), AppError> {
    let state = client.query(&FetchEvents, ()).await?;
    print_json(&*into_data(state)?)
}

async fn run_news(client: &ApiClient, args: NewsArgs) -> Result<(), AppError> {
    if args.pages == 0 {
        return Err(AppError::validation("--pages must be at least 1"));
    }
    if args.page == 0 || args.page_size == 0 {
        return Err(AppError::validation("--page and --page-size must be positive"));
    }

    let mut query = NewsQuery::new(args.q)
        .page(args.page)
        .page_size(args.page_size);
    let mut feed: Option<Arc<Paginated<Article>>> = None;

    for _ in 0..args.pages {
        let state = client.query(&FetchNews, query.clone()).await?;
        let page = into_data(state)?;
        let has_more = page.has_more();
        info!(
            page = query.page,
            loaded = page.len(),
            total = page.total_count,
            "News page loaded"
        );
        feed = Some(page);
        if !has_more {
            break;
        }
        query = query.next_page();
    }

    match feed {
        Some(feed) => print_json(&*feed),
        None => Err(AppError::unexpected("no news page was loaded")),
    }
}

async fn run_tickets(client: &ApiClient, args: TicketsArgs) -> Result<(), AppError> {
    match args.id {
        Some(id) => {
            let state = client.query(&FetchTicket, id).await?;
            print_json(&*into_data(state)?)
        }
        None => {
            let state = client.query(&FetchTickets, ()).await?;
            print_json(&*into_data(state)?)
        }
    }
}

async fn run_chat(client: &ApiClient, args: ChatArgs) -> Result<(), AppError> {
    let reply = client
        .mutate(&SendMessage, ChatRequest { prompt: args.prompt })
        .await?;
    print_json(&reply)
}

fn into_data<T>(state: QueryState<T>) -> Result<Arc<T>, AppError> {
    state.into_result().map_err(AppError::from)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
