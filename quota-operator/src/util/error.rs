use crate::quotas::discovery::GroupResource;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("Invalid quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("No monitor is watching resource: {0}")]
    UnwatchedResource(GroupResource),

    #[error("Timed out waiting for caches to sync")]
    CacheSync,

    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Collapses collected errors: none is success, one is itself, more is
    /// an aggregate.
    pub fn aggregate(errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap()),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}

fn format_aggregate(errors: &[Error]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} errors occurred: [{}]", rendered.len(), rendered.join("; "))
}
