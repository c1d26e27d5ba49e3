//! Bindings that are resolvable without any cache or network access.

/// `(prefix, namespace)`, most common first.
pub const WELL_KNOWN: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dcterms", "http://purl.org/dc/terms/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("schema", "https://schema.org/"),
    ("sh", "http://www.w3.org/ns/shacl#"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("dcat", "http://www.w3.org/ns/dcat#"),
    ("vann", "http://purl.org/vocab/vann/"),
    ("void", "http://rdfs.org/ns/void#"),
    ("geo", "http://www.opengis.net/ont/geosparql#"),
    ("time", "http://www.w3.org/2006/time#"),
    ("org", "http://www.w3.org/ns/org#"),
    ("bibo", "http://purl.org/ontology/bibo/"),
    ("sioc", "http://rdfs.org/sioc/ns#"),
    ("ldp", "http://www.w3.org/ns/ldp#"),
    ("as", "https://www.w3.org/ns/activitystreams#"),
];

pub fn namespace(prefix: &str) -> Option<&'static str> {
    WELL_KNOWN
        .iter()
        .find(|(candidate, _)| *candidate == prefix)
        .map(|(_, ns)| *ns)
}

pub fn prefix(namespace: &str) -> Option<&'static str> {
    WELL_KNOWN
        .iter()
        .find(|(_, ns)| *ns == namespace)
        .map(|(prefix, _)| *prefix)
}
