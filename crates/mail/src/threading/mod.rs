use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const REPLY_PREFIXES: [&str; 3] = ["re:", "fwd:", "fw:"];

/// Strips any run of leading `Re:`, `Fwd:` or `Fw:` prefixes (case-insensitive)
/// and surrounding whitespace. Applying it twice gives the same result.
pub fn normalize_subject(subject: &str) -> &str {
    let mut rest = subject.trim();
    loop {
        let stripped = REPLY_PREFIXES.iter().find_map(|prefix| {
            rest.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| rest[prefix.len()..].trim_start())
        });
        match stripped {
            Some(next) => rest = next,
            None => return rest.trim_end(),
        }
    }
}

/// `Re: {subject}` unless the subject already starts with `Re:`.
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// A stable Message-ID style token for a subject/sender pair.
pub fn generate_threading_id(subject: &str, from: &str, domain: &str) -> String {
    let seed = format!("{}-{}", normalize_subject(subject), from);
    format!("<{}@{}>", STANDARD.encode(seed), domain)
}

pub fn subject_matches(ticket_subject: &str, incoming_subject: &str) -> bool {
    let ticket = normalize_subject(ticket_subject).to_lowercase();
    let incoming = normalize_subject(incoming_subject).to_lowercase();
    ticket == incoming || ticket.contains(&incoming) || incoming.contains(&ticket)
}
