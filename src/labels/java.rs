use crate::labels::{Cap, DataLabel, LabelRule};

const VALIDATED: Cap = Cap::SQL.union(Cap::PATH).union(Cap::SHELL).union(Cap::REDIRECT);

pub static RULES: &[LabelRule] = &[
    // ─────────── Sources ───────────
    LabelRule {
        matchers: &[
            "getParameter_",
            "getHeader_",
            "getQueryString",
            "getCookies",
            "getRequestURI",
            "getPathInfo",
            "getReader",
            "getInputStream",
            "getenv",
        ],
        label: DataLabel::Source(Cap::all()),
    },
    // ───────── Sanitizers ──────────
    LabelRule {
        matchers: &["escapeHtml_", "htmlEscape", "encodeForHtml_", "forHtml_", "escapeXml_"],
        label: DataLabel::Sanitizer(Cap::HTML),
    },
    LabelRule {
        matchers: &["escapeSql", "encodeForSql"],
        label: DataLabel::Sanitizer(Cap::SQL),
    },
    LabelRule {
        matchers: &["normalize", "getCanonicalPath", "toRealPath", "FilenameUtils.getName"],
        label: DataLabel::Sanitizer(Cap::PATH),
    },
    LabelRule {
        matchers: &["escapeShell_", "shellQuote"],
        label: DataLabel::Sanitizer(Cap::SHELL),
    },
    LabelRule {
        matchers: &["ValidatingObjectInputStream"],
        label: DataLabel::Sanitizer(Cap::DESERIALIZE),
    },
    LabelRule {
        matchers: &["sanitize_"],
        label: DataLabel::Sanitizer(Cap::all()),
    },
    // ─────────── Guards ────────────
    LabelRule {
        matchers: &[
            "isValid_",
            "isAllowed_",
            "isSafe_",
            "isWhitelisted_",
            "isPermitted_",
            "validate_",
            "contains",
            "matches",
        ],
        label: DataLabel::Guard(VALIDATED),
    },
    LabelRule {
        matchers: &["startsWith"],
        label: DataLabel::Check(Cap::PATH),
    },
    // ─────────── Sinks ─────────────
    LabelRule {
        matchers: &[
            "executeQuery",
            "executeUpdate",
            "executeLargeUpdate",
            "execute",
            "addBatch",
            "prepareStatement",
            "prepareCall",
            "createQuery",
            "createNativeQuery",
            "createSQLQuery",
        ],
        label: DataLabel::Sink(Cap::SQL),
    },
    LabelRule {
        matchers: &["print", "println", "printf", "write", "format", "append"],
        label: DataLabel::Sink(Cap::HTML),
    },
    LabelRule {
        matchers: &[
            "File",
            "FileReader",
            "FileInputStream",
            "FileOutputStream",
            "FileWriter",
            "RandomAccessFile",
            "Paths.get",
            "Path.of",
            "Files.newInputStream",
            "Files.newOutputStream",
            "Files.newBufferedReader",
            "Files.newBufferedWriter",
            "Files.readAllBytes",
            "Files.readAllLines",
            "Files.readString",
            "Files.lines",
            "Files.write",
            "Files.writeString",
            "Files.delete",
            "Files.copy",
        ],
        label: DataLabel::Sink(Cap::PATH),
    },
    LabelRule {
        matchers: &["exec", "ProcessBuilder"],
        label: DataLabel::Sink(Cap::SHELL),
    },
    LabelRule {
        matchers: &["Cipher.getInstance", "KeyGenerator.getInstance", "SecretKeyFactory.getInstance"],
        label: DataLabel::Sink(Cap::CIPHER),
    },
    LabelRule {
        matchers: &["sendRedirect", "getRequestDispatcher"],
        label: DataLabel::Sink(Cap::REDIRECT),
    },
    LabelRule {
        matchers: &["readObject", "readUnshared"],
        label: DataLabel::Sink(Cap::DESERIALIZE),
    },
    LabelRule {
        // also catches `Math.random` and `java.util.Random`, not `SecureRandom`
        matchers: &["Random"],
        label: DataLabel::Sink(Cap::RANDOM),
    },
    // ─────────── Writers ───────────
    LabelRule {
        matchers: &["getWriter", "getOutputStream"],
        label: DataLabel::Writer,
    },
];
