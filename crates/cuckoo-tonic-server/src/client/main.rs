use clap::Parser;
use cuckoo_tonic_core::{
    FilterStatus,
    proto::{
        self, CountElementsRequest, CreateFilterRequest, DeleteElementRequest,
        DeleteFilterRequest, InsertElementRequest, InsertElementsRequest, ListFiltersRequest,
        LookupElementRequest, LookupElementsRequest, LookupElementsStreamRequest,
        ResetFilterRequest, cuckoo_filter_client::CuckooFilterClient,
    },
};
use rand::Rng;
use std::time::Instant;
use tokio_stream::StreamExt;
use tonic::{codec::CompressionEncoding, transport::Channel};

type Client = CuckooFilterClient<Channel>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const FILTER: &str = "f1";
const SCRATCH_FILTER: &str = "f2";

/// Walks through every RPC of the filter registry and prints the outcomes.
#[derive(Parser, Debug)]
#[command(name = "cuckoo-client", version)]
struct Args {
    /// Server endpoint.
    #[arg(long, env = "CUCKOO_ADDR", default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Number of random lookups sent over the streaming session.
    #[arg(long, default_value_t = 1_000)]
    stream_lookups: usize,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let channel = Channel::from_shared(args.addr.clone())?.connect().await?;
    let mut client = CuckooFilterClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    println!("\n=== Filter lifecycle against {} ===", args.addr);

    let status = client
        .create_filter(CreateFilterRequest {
            filter_name: FILTER.to_owned(),
            capacity: 10_000,
        })
        .await?
        .into_inner()
        .status;
    report("CreateFilter", status);

    let elements: Vec<String> = (0..100).map(|i| format!("element-{i}")).collect();
    let resp = client
        .insert_elements(InsertElementsRequest {
            filter_name: FILTER.to_owned(),
            elements: elements.clone(),
        })
        .await?
        .into_inner();
    report("InsertElements", resp.status);
    if !resp.failed_elements.is_empty() {
        println!("  failed: {:?}", resp.failed_elements);
    }

    let status = client
        .insert_element(InsertElementRequest {
            filter_name: FILTER.to_owned(),
            element: "jack".to_owned(),
        })
        .await?
        .into_inner()
        .status;
    report("InsertElement", status);

    print_count(&mut client).await?;

    let status = client
        .lookup_element(LookupElementRequest {
            filter_name: FILTER.to_owned(),
            element: "jack".to_owned(),
        })
        .await?
        .into_inner()
        .status;
    report("LookupElement jack", status);

    let status = client
        .delete_element(DeleteElementRequest {
            filter_name: FILTER.to_owned(),
            element: "jack".to_owned(),
        })
        .await?
        .into_inner()
        .status;
    report("DeleteElement jack", status);

    print_count(&mut client).await?;

    let mut queried: Vec<String> = elements.iter().take(5).cloned().collect();
    queried.extend(["missing-1".to_owned(), "missing-2".to_owned()]);
    let resp = client
        .lookup_elements(LookupElementsRequest {
            filter_name: FILTER.to_owned(),
            elements: queried,
        })
        .await?
        .into_inner();
    report("LookupElements", resp.status);
    println!("  matched: {:?}", resp.elements);

    run_stream(&mut client, &elements, args.stream_lookups).await?;

    let status = client
        .reset_filter(ResetFilterRequest {
            filter_name: FILTER.to_owned(),
        })
        .await?
        .into_inner()
        .status;
    report("ResetFilter", status);

    print_count(&mut client).await?;

    println!("\n=== Registry management ===");

    let status = client
        .create_filter(CreateFilterRequest {
            filter_name: SCRATCH_FILTER.to_owned(),
            capacity: 100,
        })
        .await?
        .into_inner()
        .status;
    report("CreateFilter f2", status);

    print_list(&mut client).await?;

    let status = client
        .delete_filter(DeleteFilterRequest {
            filter_name: SCRATCH_FILTER.to_owned(),
        })
        .await?
        .into_inner()
        .status;
    report("DeleteFilter f2", status);

    print_list(&mut client).await?;

    Ok(())
}

/// Streams a mix of known and random elements and counts the matches.
async fn run_stream(client: &mut Client, known: &[String], lookups: usize) -> Result<(), BoxError> {
    let requests: Vec<LookupElementsStreamRequest> = {
        let mut rng = rand::rng();
        (0..lookups)
            .map(|_| {
                let element = if rng.random_bool(0.5) {
                    known[rng.random_range(0..known.len())].clone()
                } else {
                    format!("random-{}", rng.random::<u64>())
                };
                LookupElementsStreamRequest {
                    filter_name: FILTER.to_owned(),
                    element,
                }
            })
            .collect()
    };

    let start = Instant::now();
    let mut responses = client
        .lookup_elements_stream(tokio_stream::iter(requests))
        .await?
        .into_inner();

    let mut matched = 0usize;
    while let Some(resp) = responses.next().await {
        let _element = resp?.element;
        matched += 1;
    }

    println!(
        "{:<22} | {matched} of {lookups} matched in {:.2} ms",
        "LookupElementsStream",
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

async fn print_count(client: &mut Client) -> Result<(), BoxError> {
    let resp = client
        .count_elements(CountElementsRequest {
            filter_name: FILTER.to_owned(),
        })
        .await?
        .into_inner();
    report("CountElements", resp.status);
    println!("  len: {}", resp.len);
    Ok(())
}

async fn print_list(client: &mut Client) -> Result<(), BoxError> {
    let resp = client
        .list_filters(ListFiltersRequest {})
        .await?
        .into_inner();
    report("ListFilters", resp.status);
    println!("  filters: {:?}", resp.filters);
    Ok(())
}

fn report(label: &str, status: Option<proto::Status>) {
    match status {
        Some(proto::Status { code, msg }) => {
            let known = FilterStatus::from_code(code)
                .map_or_else(|| "Unknown".to_owned(), |status| format!("{status:?}"));
            println!("{label:<22} | {code} {known} ({msg})");
        }
        None => println!("{label:<22} | <no status>"),
    }
}
