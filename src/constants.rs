//! Application-wide constants and tuning tables

/// Crawler defaults (all overridable through `CrawlerConfig`)
pub mod crawler {
    pub const DEFAULT_MAX_CANDIDATES: usize = 10;

    /// Total attempts per fetch, including the first one
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Exponential backoff base (delay = base * 2^(attempt-1), capped)
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
    pub const DEFAULT_BACKOFF_CAP_MS: u64 = 8_000;

    pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 15_000;
    pub const DEFAULT_OVERALL_CRAWL_TIMEOUT_MS: u64 = 120_000;

    /// Normalized documents are cut to this many characters
    pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 20_000;

    /// How much of the fetched text is exposed to the scorer
    pub const SCORING_EXCERPT_CHARS: usize = 2_000;

    /// Pre-fetch score of a candidate the caller named explicitly
    pub const PINNED_CANDIDATE_SCORE: f64 = 1.0;

    pub const DEFAULT_USER_AGENT: &str =
        "MarketPulse/1.0 (Business Development Analysis Tool)";

    /// Token matched against `User-agent:` lines in robots.txt
    pub const ROBOTS_AGENT_TOKEN: &str = "marketpulse";
}

/// Search defaults
pub mod search {
    pub const DEFAULT_ENDPOINT: &str = "http://localhost:8888/search";
    pub const DEFAULT_MAX_QUERIES: usize = 4;
    pub const DEFAULT_RESULTS_PER_QUERY: usize = 10;
    pub const DEFAULT_QUERY_DELAY_MS: u64 = 500;

    /// `{company}` is replaced with the normalized company name
    pub const QUERY_TEMPLATES: &[&str] = &[
        "{company} press release",
        "{company} announces",
        "{company} clinical trial results",
        "{company} partnership announcement",
        "{company} license agreement",
        "{company} acquisition news",
        "{company} news update",
        "{company} investor update",
    ];

    /// Legal suffixes stripped before querying
    pub const COMPANY_SUFFIXES: &[&str] = &[
        "inc.", "inc", "llc", "ltd.", "ltd", "corp.", "corp", "corporation", "plc",
    ];

    /// Query parameters dropped when normalizing URLs for dedup
    pub const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];
}

/// Scoring tables
pub mod scoring {
    pub const DEFAULT_DOMAIN_WEIGHT: f64 = 0.4;
    pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.4;
    pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.2;

    /// Tolerance for "weights sum to 1.0"
    pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

    /// Documents older than this get zero recency
    pub const DEFAULT_RECENCY_HORIZON_DAYS: i64 = 730;

    /// Documents newer than this get full recency
    pub const FRESH_WINDOW_DAYS: i64 = 30;

    /// Recency used when no date can be extracted
    pub const NEUTRAL_RECENCY: f64 = 0.5;

    /// Curated press, news and biotech trade domains
    pub const TRUSTED_DOMAINS: &[&str] = &[
        "reuters.com",
        "bloomberg.com",
        "biospace.com",
        "fiercebiotech.com",
        "fiercepharma.com",
        "biopharmadive.com",
        "endpts.com",
        "statnews.com",
        "genengnews.com",
        "pharmatimes.com",
        "pharmalive.com",
        "bioworld.com",
        "businesswire.com",
        "globenewswire.com",
        "prnewswire.com",
    ];

    /// URL path fragments typical of press releases
    pub const PRESS_PATH_PATTERNS: &[&str] = &[
        "press-release",
        "press_release",
        "pressrelease",
        "/press/",
        "/news/",
        "/media/",
        "announcement",
    ];

    /// URL path fragments typical of pipeline / deal pages
    pub const PIPELINE_PATH_PATTERNS: &[&str] = &[
        "pipeline",
        "clinical",
        "trial",
        "results",
        "partnership",
        "collaboration",
        "license",
        "acquisition",
    ];

    pub const BIOTECH_TLDS: &[&str] = &[".bio", ".pharma", ".healthcare", ".health"];

    /// Life-sciences keywords counted in title/snippet/excerpt
    pub const DOMAIN_KEYWORDS: &[&str] = &[
        "press release",
        "announces",
        "clinical",
        "trial",
        "phase",
        "fda",
        "approval",
        "pipeline",
        "partnership",
        "collaboration",
        "license",
        "acquisition",
        "therapeutics",
        "biotech",
    ];

    /// Keyword hits needed for a full domain-keyword signal
    pub const DOMAIN_KEYWORD_SATURATION: usize = 3;

    /// Split of the keyword signal between company terms and domain keywords
    pub const COMPANY_TERM_SHARE: f64 = 0.6;
}

/// Text-generation defaults
pub mod llm {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_MAX_TOKENS: u32 = 1_500;
    pub const DEFAULT_MAX_CONCURRENT: usize = 2;
    pub const DEFAULT_QUEUE_SIZE: usize = 32;

    /// Source text forwarded to the analyst prompt
    pub const MAX_PROMPT_SOURCE_CHARS: usize = 12_000;
}

/// Keyword and pattern tables for deterministic signal extraction
pub mod signals {
    pub const THERAPEUTIC_AREAS: &[(&str, &[&str])] = &[
        ("Oncology", &["cancer", "tumor", "oncology", "carcinoma", "leukemia", "lymphoma"]),
        ("Immunology", &["immune", "immunology", "autoimmune", "inflammation"]),
        ("Neurology", &["neurology", "neurological", "alzheimer", "parkinson", "cns"]),
        ("Cardiovascular", &["cardiac", "heart", "cardiovascular", "vascular"]),
        ("Metabolic", &["diabetes", "obesity", "metabolic", "endocrine"]),
        ("Infectious Disease", &["infection", "viral", "bacterial", "antiviral", "antibiotic"]),
        ("Rare Disease", &["rare disease", "orphan drug", "genetic disorder"]),
    ];

    pub const MECHANISMS: &[(&str, &[&str])] = &[
        ("Monoclonal Antibody", &["monoclonal", "antibody"]),
        ("Small Molecule", &["small molecule", "inhibitor", "agonist", "antagonist"]),
        ("Cell Therapy", &["cell therapy", "car-t", "stem cell"]),
        ("Gene Therapy", &["gene therapy", "gene editing", "crispr"]),
        ("RNA Therapy", &["mrna", "sirna", "antisense"]),
        ("Vaccine", &["vaccine", "immunization"]),
    ];

    pub const DEAL_TYPES: &[(&str, &[&str])] = &[
        ("Co-development", &["co-development", "co-develop", "joint development"]),
        ("Licensing", &["license", "licensing", "royalty", "milestone payment"]),
        ("Strategic Alliance", &["strategic alliance", "collaboration", "partnership"]),
        ("Acquisition", &["acquire", "acquisition", "merger", "takeover"]),
        ("Financing", &["financing", "funding round", "series a", "series b", "private placement"]),
    ];

    /// Development stages as (label, case-insensitive pattern), later stages first
    pub const PHASE_PATTERNS: &[(&str, &str)] = &[
        ("Approved", r"\b(?:fda|ema)[\s-]approved\b|\bapproved\s+by\b|\bmarketing\s+authori[sz]ation\b"),
        ("Phase 3", r"\bphase\s*(?:3|iii)\b"),
        ("Phase 2", r"\bphase\s*(?:2|ii)\b"),
        ("Phase 1", r"\bphase\s*(?:1|i)\b"),
        ("IND", r"\bind[\s-]*enabling\b|\binvestigational\s+new\s+drug\b"),
        ("Preclinical", r"\bpre-?clinical\b"),
    ];

    /// Sentence patterns that mark a market trend
    pub const TREND_PATTERNS: &[&str] = &[
        r"increasing\b.*\bdemand",
        r"growing\b.*\bmarket",
        r"emerging\b.*\btechnolog",
        r"\bnew\b.*\bapproach",
        r"innovative\b.*\bsolution",
        r"breakthrough\b.*\btreatment",
        r"advancement\b.*\bin\b",
        r"expansion\b.*\binto\b",
        r"\bfocus\b.*\bon\b",
    ];

    /// Sentence patterns that mark a risk
    pub const RISK_PATTERNS: &[&str] = &[
        r"\brisks?\b.*\bof\b",
        r"challeng\w*\b.*\bin\b",
        r"concerns?\b.*\babout\b",
        r"limitations?\b.*\bof\b",
        r"barriers?\b.*\bto\b",
        r"\bdelay\w*\b.*\bin\b",
        r"\bissues?\b.*\bwith\b",
        r"\bthreat\w*\b.*\bto\b",
        r"uncertaint\w*\b.*\bin\b",
    ];

    /// Upper bound on each deterministically extracted list
    pub const MAX_EXTRACTED_ITEMS: usize = 5;

    /// Longest sentence kept as a trend, risk or deal summary
    pub const MAX_EXTRACT_SENTENCE_CHARS: usize = 240;
}

/// Therapeutic-area market profiles: (area, market size in $B, CAGR %)
pub mod market {
    pub const AREA_PROFILES: &[(&str, f64, f64)] = &[
        ("Oncology", 150.0, 12.0),
        ("Immunology", 80.0, 10.0),
        ("Neurology", 60.0, 8.0),
        ("Cardiovascular", 70.0, 6.0),
        ("Metabolic", 50.0, 7.0),
        ("Infectious Disease", 40.0, 9.0),
        ("Rare Disease", 30.0, 15.0),
    ];
}

/// Advisor scoring bands and fallback playbook
pub mod advisor {
    pub const LARGE_MARKET_BN: f64 = 100.0;
    pub const MODERATE_MARKET_BN: f64 = 50.0;
    pub const HIGH_GROWTH_PCT: f64 = 10.0;
    pub const MODERATE_GROWTH_PCT: f64 = 5.0;
    pub const STRONG_PIPELINE: usize = 5;
    pub const MODERATE_PIPELINE: usize = 2;
    pub const LIMITED_COMPETITION: usize = 3;
    pub const MODERATE_COMPETITION: usize = 5;

    /// Assessment score (4..=12) bands
    pub const HIGH_POTENTIAL_SCORE: u32 = 10;
    pub const MODERATE_POTENTIAL_SCORE: u32 = 7;

    pub const IMMEDIATE_ACTIONS: &[&str] = &[
        "Engage BD team for partnership discussions",
        "Accelerate clinical development",
        "Expand market access",
    ];
    pub const MARKET_ENTRY: &[&str] = &[
        "Leverage existing expertise",
        "Consider combination therapies",
        "Explore adjacent markets",
    ];
    pub const RISK_MITIGATION: &[&str] = &[
        "Monitor competitive pipeline",
        "Establish contingency plans",
        "Strengthen regulatory strategy",
    ];
    pub const VALUE_CREATION: &[&str] = &[
        "Strategic acquisitions",
        "Technology partnerships",
        "R&D collaborations",
    ];
}

/// Run registry retention for the HTTP job API
pub mod api {
    pub const DEFAULT_FINISHED_RUN_TTL_SECS: u64 = 3600;
    pub const DEFAULT_MAX_FINISHED_RUNS: usize = 1000;
    /// Used when a configured TTL does not fit a chrono duration
    pub const RETENTION_CEILING_DAYS: i64 = 36_500;
}

/// Event names for structured logging
pub mod events {
    pub const CANDIDATE_ACCEPTED: &str = "candidate_accepted";
    pub const CANDIDATE_BELOW_THRESHOLD: &str = "candidate_below_threshold";
    pub const CANDIDATE_FETCH_FAILED: &str = "candidate_fetch_failed";
    pub const FETCH_RETRY: &str = "fetch_retry";
    pub const STAGE_TRANSITION: &str = "stage_transition";
}
