//! Rule definitions for every framework configuration surface.
//!
//! Shared fragments (`security`, `labels`, `abs_path`, `pre`, ...) are plain
//! functions returning fresh rules; derived kinds extend a fragment with
//! [`Rule::keys`], which leaves the fragment itself untouched.

use regex::Regex;

use crate::registry::SchemaKind;
use crate::rule::Rule;

const FAIL_ACTIONS: [&str; 3] = ["error", "log", "ignore"];

/// Build the rule for `kind`.
pub fn rule_for(kind: SchemaKind) -> Rule {
    match kind {
        SchemaKind::Cache => cache(),
        SchemaKind::Security => security(),
        SchemaKind::Labels => labels(),
        SchemaKind::AbsPath => abs_path(),
        SchemaKind::ConnectionBase => connection_base(),
        SchemaKind::Server => server(),
        SchemaKind::Connection => connection(),
        SchemaKind::Vhost => vhost(),
        SchemaKind::Route => route(),
        SchemaKind::Pre => Rule::alternatives(pre()),
        SchemaKind::Auth => auth(),
        SchemaKind::RouteConfig => route_config(),
        SchemaKind::CachePolicy => cache_policy(),
        SchemaKind::Method => method(),
        SchemaKind::Register => register(),
        SchemaKind::State => state(),
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("catalog patterns are constant and valid")
}

fn string_or_strings() -> Rule {
    Rule::alternatives([Rule::string(), Rule::array().includes([Rule::string()])])
}

fn object_or_func() -> Rule {
    Rule::alternatives([Rule::object(), Rule::func()])
}

fn fail_action() -> Rule {
    Rule::string().valid(FAIL_ACTIONS)
}

fn timeout() -> Rule {
    Rule::number().integer().positive().allow(false)
}

fn cache() -> Rule {
    Rule::object_of([
        ("name", Rule::string().invalid(["_default"])),
        ("partition", Rule::string()),
        ("shared", Rule::boolean()),
        ("engine", object_or_func().required()),
    ])
    .unknown(true)
}

fn security() -> Rule {
    Rule::object_of([
        (
            "hsts",
            Rule::alternatives([
                Rule::object_of([
                    ("maxAge", Rule::number()),
                    ("includeSubdomains", Rule::boolean()),
                ]),
                Rule::boolean(),
                Rule::number(),
            ]),
        ),
        (
            "xframe",
            Rule::alternatives([
                Rule::boolean(),
                Rule::string().valid(["sameorigin", "deny"]),
                Rule::object_of([
                    (
                        "rule",
                        Rule::string().valid(["sameorigin", "deny", "allow-from"]),
                    ),
                    ("source", Rule::string()),
                ]),
            ]),
        ),
        ("xss", Rule::boolean()),
        ("noOpen", Rule::boolean()),
        ("noSniff", Rule::boolean()),
    ])
    .allow_null()
    .allow(false)
    .allow(true)
}

fn labels() -> Rule {
    string_or_strings()
}

fn abs_path() -> Rule {
    Rule::string().regex(pattern(r"^([\/\.])|([A-Za-z]:\\)|(\\\\)"))
}

fn connection_base() -> Rule {
    Rule::object_of([
        ("app", Rule::object().allow_null()),
        (
            "cors",
            Rule::object_of([
                ("origin", Rule::array()),
                ("matchOrigin", Rule::boolean()),
                ("isOriginExposed", Rule::boolean()),
                ("maxAge", Rule::number()),
                ("headers", Rule::array()),
                ("additionalHeaders", Rule::array()),
                ("methods", Rule::array()),
                ("additionalMethods", Rule::array()),
                ("exposedHeaders", Rule::array()),
                ("additionalExposedHeaders", Rule::array()),
                ("credentials", Rule::boolean()),
                ("override", Rule::boolean()),
            ])
            .allow_null()
            .allow(false)
            .allow(true),
        ),
        ("security", security()),
        (
            "files",
            Rule::object_of([("relativeTo", abs_path().required())]),
        ),
        (
            "json",
            Rule::object_of([
                (
                    "replacer",
                    Rule::alternatives([Rule::func(), Rule::array()]).allow_null(),
                ),
                ("space", Rule::number().allow_null()),
                ("suffix", Rule::string().allow_null()),
            ]),
        ),
        ("load", Rule::object()),
        (
            "cacheControlStatus",
            Rule::array()
                .min_items(1)
                .includes([Rule::number().integer().min(200.0)]),
        ),
        (
            "payload",
            Rule::object_of([("maxBytes", Rule::number()), ("uploads", Rule::string())]),
        ),
        ("plugins", Rule::object()),
        (
            "router",
            Rule::object_of([
                ("isCaseSensitive", Rule::boolean()),
                ("stripTrailingSlash", Rule::boolean()),
            ]),
        ),
        ("validation", Rule::object().allow_null()),
        (
            "state",
            Rule::object_of([(
                "cookies",
                Rule::object_of([
                    ("parse", Rule::boolean()),
                    ("failAction", fail_action()),
                    ("clearInvalid", Rule::boolean()),
                    ("strictHeader", Rule::boolean()),
                ]),
            )]),
        ),
        (
            "timeout",
            Rule::object_of([
                ("socket", timeout()),
                ("client", timeout().required()),
                ("server", timeout().required()),
            ]),
        ),
    ])
}

fn server() -> Rule {
    Rule::object_of([
        ("app", Rule::object().allow_null()),
        (
            "cache",
            Rule::alternatives([
                Rule::func(),
                cache(),
                Rule::array().includes([cache()]).min_items(1),
            ])
            .allow_null(),
        ),
        ("connections", connection_base()),
        (
            "debug",
            Rule::object_of([("request", Rule::array().allow(false))]).allow(false),
        ),
        (
            "files",
            Rule::object_of([("etagsCacheMaxSize", Rule::number().min(0.0))]),
        ),
        ("load", Rule::object()),
        ("mime", Rule::object()),
        ("plugins", Rule::object()),
    ])
}

fn connection() -> Rule {
    connection_base().keys([
        ("autoListen", Rule::boolean()),
        ("host", Rule::string().hostname().allow_null()),
        ("labels", labels()),
        ("listener", Rule::any()),
        (
            "port",
            Rule::alternatives([
                // tcp port
                Rule::number().integer().min(0.0),
                // unix domain socket
                Rule::string().regex(pattern(r"/")),
                // windows named pipe
                Rule::string().regex(pattern(r"^\\\\\.\\pipe\\")),
            ])
            .allow_null(),
        ),
        ("tls", Rule::object().allow_null()),
    ])
}

fn vhost() -> Rule {
    Rule::alternatives([
        Rule::string().hostname(),
        Rule::array()
            .includes([Rule::string().hostname()])
            .min_items(1),
    ])
}

fn route() -> Rule {
    Rule::object_of([
        (
            "method",
            Rule::alternatives([
                Rule::string(),
                Rule::array().includes([Rule::string()]).min_items(1),
            ])
            .required(),
        ),
        ("path", Rule::string().required()),
        ("vhost", vhost()),
        // checked later against the route config
        ("handler", Rule::any()),
        ("config", Rule::object().allow_null()),
    ])
}

fn pre() -> Vec<Rule> {
    vec![
        Rule::string(),
        Rule::func(),
        Rule::object_of([
            (
                "method",
                Rule::alternatives([Rule::string(), Rule::func()]).required(),
            ),
            ("assign", Rule::string()),
            ("mode", Rule::string().valid(["serial", "parallel"])),
            ("failAction", fail_action()),
        ]),
    ]
}

fn auth() -> Rule {
    Rule::alternatives([
        Rule::string(),
        Rule::object_of([
            ("mode", Rule::string().valid(["required", "optional", "try"])),
            (
                "scope",
                Rule::alternatives([Rule::string(), Rule::array()]),
            ),
            ("entity", Rule::string().valid(["user", "app", "any"])),
            ("strategy", Rule::string()),
            ("strategies", Rule::array().min_items(1)),
            (
                "payload",
                Rule::alternatives([
                    Rule::string().valid(["required", "optional"]),
                    Rule::boolean(),
                ]),
            ),
        ])
        .without("strategy", &["strategies"]),
    ])
}

/// Schema slot of `validate` and `response`: a document, a callable, or a
/// boolean switch (`true` skips, `false` forbids any keys).
fn schema_slot() -> Rule {
    object_or_func().allow(true).allow(false)
}

fn route_config() -> Rule {
    let mut pre_items = pre();
    pre_items.push(Rule::array().includes(pre()).min_items(1));

    Rule::object_of([
        ("id", Rule::string()),
        ("pre", Rule::array().includes(pre_items)),
        (
            "handler",
            Rule::alternatives([Rule::func(), Rule::string(), Rule::object().length(1)]),
        ),
        ("bind", Rule::object().allow_null()),
        (
            "payload",
            Rule::object_of([
                ("output", Rule::string().valid(["data", "stream", "file"])),
                ("parse", Rule::boolean().allow("gunzip")),
                ("allow", Rule::alternatives([Rule::string(), Rule::array()])),
                ("override", Rule::string()),
                ("maxBytes", Rule::number()),
                ("uploads", Rule::string()),
                ("failAction", fail_action()),
                ("timeout", timeout()),
            ]),
        ),
        ("auth", auth().allow(false)),
        (
            "validate",
            Rule::object_of([
                ("headers", schema_slot().allow_null()),
                ("params", schema_slot().allow_null()),
                ("query", schema_slot().allow_null()),
                ("payload", schema_slot().allow_null()),
                (
                    "failAction",
                    Rule::alternatives([fail_action(), Rule::func()]),
                ),
                ("errorFields", Rule::object()),
            ])
            .or(&["headers", "params", "query", "payload"]),
        ),
        (
            "response",
            Rule::object_of([
                ("schema", schema_slot()),
                (
                    "status",
                    Rule::object().pattern_key(pattern(r"^\d\d\d$"), schema_slot()),
                ),
                ("sample", Rule::number().min(0.0).max(100.0)),
                ("failAction", Rule::string().valid(["error", "log"])),
                ("modify", Rule::boolean()),
            ])
            .or(&["schema", "status"])
            .without("modify", &["sample"]),
        ),
        (
            "cache",
            Rule::object_of([
                (
                    "privacy",
                    Rule::string().valid(["default", "public", "private"]),
                ),
                ("expiresIn", Rule::number()),
                ("expiresAt", Rule::string()),
            ])
            .xor(&["expiresIn", "expiresAt"]),
        ),
        ("cors", Rule::boolean()),
        ("security", security()),
        ("jsonp", Rule::string()),
        ("app", Rule::object().allow_null()),
        ("plugins", Rule::object()),
        ("description", Rule::string()),
        ("notes", string_or_strings()),
        ("tags", string_or_strings()),
        ("files", Rule::object_of([("relativeTo", abs_path())])),
    ])
}

fn cache_policy() -> Rule {
    Rule::object_of([
        ("cache", Rule::string().allow_null().allow("")),
        ("segment", Rule::string()),
        ("shared", Rule::boolean()),
    ])
    // remaining keys belong to the cache client
    .unknown(true)
}

fn method() -> Rule {
    Rule::object_of([
        ("bind", Rule::object().allow_null()),
        ("generateKey", Rule::func()),
        ("cache", cache_policy()),
        ("callback", Rule::boolean()),
    ])
}

fn register() -> Rule {
    Rule::object_of([
        (
            "route",
            Rule::object_of([
                ("prefix", Rule::string().regex(pattern(r"^/.+"))),
                ("vhost", vhost()),
            ]),
        ),
        ("select", labels()),
    ])
}

fn password() -> Rule {
    Rule::alternatives([Rule::string(), Rule::binary(), Rule::object()])
}

fn state() -> Rule {
    Rule::object_of([
        ("strictHeader", Rule::boolean()),
        ("failAction", fail_action()),
        ("clearInvalid", Rule::boolean()),
        ("isSecure", Rule::boolean()),
        ("isHttpOnly", Rule::boolean()),
        ("path", Rule::string()),
        ("domain", Rule::string()),
        ("ttl", Rule::number().allow_null()),
        (
            "encoding",
            Rule::string().valid(["base64json", "base64", "form", "iron", "none"]),
        ),
        (
            "sign",
            Rule::object_of([("password", password()), ("integrity", Rule::object())]),
        ),
        ("iron", Rule::object()),
        ("password", password()),
        ("autoValue", Rule::any()),
        ("passThrough", Rule::boolean()),
    ])
}
